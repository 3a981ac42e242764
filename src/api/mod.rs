//! HTTP surface for the orchestrator: push, query, pause, and dump over a
//! small JSON API.

use std::net::SocketAddr;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ConductorError;
use crate::queue::{Job, JobQuery, QueueClient};

#[derive(Clone)]
pub struct ApiState {
    pub queue: QueueClient,
}

#[derive(Deserialize)]
pub struct PushJobRequest {
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub independent_blockers: Vec<i64>,
    #[serde(default)]
    pub relevant_blockers: Vec<i64>,
    #[serde(default)]
    pub inputs: Vec<String>,
}

#[derive(Serialize)]
struct PushJobResponse {
    success: bool,
    job_id: Option<i64>,
    error: Option<String>,
}

#[derive(Serialize)]
struct JobResponse {
    id: i64,
    priority: i64,
    status: String,
    independent_blockers: Vec<i64>,
    relevant_blockers: Vec<i64>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    spawn_time_seconds: i64,
}

#[derive(Deserialize)]
pub struct JobsQuery {
    pub priority: Option<i64>,
}

#[derive(Serialize)]
struct AckResponse {
    success: bool,
    error: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs", post(push_job_handler))
        .route("/api/pause", post(toggle_pause_handler))
        .route("/api/dump", post(dump_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting API server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
            return;
        }
    };

    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "API server failed");
    }
}

fn status_for(error: &ConductorError) -> StatusCode {
    match error {
        ConductorError::Initialising => StatusCode::SERVICE_UNAVAILABLE,
        ConductorError::MutualBlockers(_, _) => StatusCode::BAD_REQUEST,
        ConductorError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn push_job_handler(
    State(state): State<ApiState>,
    Json(payload): Json<PushJobRequest>,
) -> impl IntoResponse {
    let job = Job::new(
        payload.priority,
        payload.independent_blockers,
        payload.relevant_blockers,
        payload.inputs,
    );

    match state.queue.push(job).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(PushJobResponse {
                success: true,
                job_id: Some(job_id),
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(PushJobResponse {
                success: false,
                job_id: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn list_jobs_handler(
    State(state): State<ApiState>,
    Query(params): Query<JobsQuery>,
) -> impl IntoResponse {
    let query = match params.priority {
        Some(priority) => JobQuery::AtPriority(priority),
        None => JobQuery::All,
    };

    match state.queue.query(query).await {
        Ok(jobs) => {
            let jobs: Vec<JobResponse> = jobs
                .into_iter()
                .map(|job| JobResponse {
                    id: job.id,
                    priority: job.priority,
                    status: job.status.to_string(),
                    independent_blockers: job.independent_blockers,
                    relevant_blockers: job.relevant_blockers,
                    inputs: job.inputs,
                    outputs: job.outputs,
                    spawn_time_seconds: job.spawn_time_seconds,
                })
                .collect();
            (StatusCode::OK, Json(jobs)).into_response()
        }
        Err(e) => (
            status_for(&e),
            Json(AckResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

pub async fn toggle_pause_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state.queue.toggle_pause().await {
        Ok(_) => (
            StatusCode::OK,
            Json(AckResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(AckResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

pub async fn dump_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state.queue.dump().await {
        Ok(ok) => (
            StatusCode::OK,
            Json(AckResponse {
                success: ok,
                error: None,
            }),
        ),
        Err(e) => (
            status_for(&e),
            Json(AckResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}
