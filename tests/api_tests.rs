//! HTTP surface tests wired to a live queue service.


use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use conductor::api::{router, ApiState};
use conductor::config::TickBudgets;
use conductor::database::JobDatabase;
use conductor::queue::{JobQueueService, QueueContext, QueueInput};
use test_harness::{assert_eventually, StubExecutor};

struct ApiRig {
    state: ApiState,
    stub: StubExecutor,
    _tmp: TempDir,
}

/// Bring up a queue service behind an `ApiState`. When `initialised` is
/// false the service receives no heartbeats and stays in Init.
async fn start_api(initialised: bool) -> ApiRig {
    let tmp = TempDir::new().expect("temp dir");
    let stub = StubExecutor::spawn(16);
    let ctx = QueueContext {
        executor: stub.client.clone(),
        database: JobDatabase::spawn(tmp.path().join("checkpoint.json")),
        budgets: TickBudgets::default(),
    };

    let (service, input_rx) = JobQueueService::new(ctx, 100);
    let client = service.client();
    let heartbeat_tx = service.input_sender();
    tokio::spawn(service.run(input_rx, CancellationToken::new()));

    // Drive initialisation with manual heartbeats so no background tick
    // can dispatch jobs mid-assertion later.
    if initialised {
        let probe = client.clone();
        assert_eventually(
            || {
                let heartbeat_tx = heartbeat_tx.clone();
                let probe = probe.clone();
                async move {
                    let _ = heartbeat_tx.send(QueueInput::Heartbeat).await;
                    probe.query(conductor::queue::JobQuery::All).await.is_ok()
                }
            },
            Duration::from_secs(2),
            "service should finish initialising",
        )
        .await;
    }

    ApiRig {
        state: ApiState { queue: client },
        stub,
        _tmp: tmp,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn push_then_list_round_trips() {
    let rig = start_api(true).await;
    let app = router(rig.state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/jobs")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "priority": 7,
                        "inputs": ["echo hi"]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let push = body_json(response).await;
    assert_eq!(push["success"], json!(true));
    let job_id = push["job_id"].as_i64().expect("job id");

    let response = app
        .oneshot(Request::builder().uri("/api/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let jobs = body_json(response).await;
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"].as_i64(), Some(job_id));
    assert_eq!(jobs[0]["priority"], json!(7));
    assert_eq!(jobs[0]["status"], json!("queued"));
}

#[tokio::test]
async fn priority_filter_narrows_the_listing() {
    let rig = start_api(true).await;
    let app = router(rig.state.clone());

    for priority in [1, 2, 1] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "priority": priority }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/jobs?priority=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let jobs = body_json(response).await;
    assert_eq!(jobs.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn push_while_initialising_is_rejected() {
    let rig = start_api(false).await;
    let app = router(rig.state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/jobs")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "priority": 0 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let push = body_json(response).await;
    assert_eq!(push["success"], json!(false));
    assert!(push["error"]
        .as_str()
        .unwrap()
        .contains("initialising"));
}

#[tokio::test]
async fn pause_endpoint_toggles_the_queue() {
    let mut rig = start_api(true).await;
    let app = router(rig.state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/pause")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/jobs")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "inputs": ["held"] }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/api/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let jobs = body_json(response).await;
    assert_eq!(jobs[0]["status"], json!("paused"));
    rig.stub.expect_no_dispatch().await;
}

#[tokio::test]
async fn dump_endpoint_reports_success() {
    let rig = start_api(true).await;
    let app = router(rig.state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/dump")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let dump = body_json(response).await;
    assert_eq!(dump["success"], json!(true));
    assert!(rig._tmp.path().join("checkpoint.json").exists());
}
