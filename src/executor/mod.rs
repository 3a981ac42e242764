//! Job execution engine.
//!
//! The queue talks to the executor through a narrow, channel-based contract:
//!
//! 1. [`ExecuteRequest::new`] pairs a request with an [`ExecuteHandle`]
//!    *before* submission, so the caller never loses track of a job it
//!    handed over.
//! 2. [`ExecutorClient::submit`] is a non-blocking `try_send` on a bounded
//!    channel; `false` means the executor is full and the caller should
//!    retry later (backpressure, not an error).
//! 3. Once a worker picks the request up it acknowledges acceptance, then
//!    eventually resolves the outcome half of the handle with a
//!    [`JobOutcome`].
//!
//! The concrete [`JobExecutor`] is a small worker pool that runs each of a
//! job's input strings as a shell command and collects stdout lines into
//! the job's outputs. Tests substitute their own endpoint by building an
//! [`ExecutorClient`] around a channel they hold the receiving end of.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::ExecutorConfig;
use crate::queue::job::{Job, JobStatus};

/// What became of an executed job.
///
/// `status == JobStatus::Error` indicates failure regardless of payload.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: i64,
    pub status: JobStatus,
    pub payload: OutcomePayload,
}

/// A job either produces output strings or expands into child jobs that
/// dependents must now wait on instead.
#[derive(Debug)]
pub enum OutcomePayload {
    Outputs(Vec<String>),
    Children(Vec<Job>),
}

/// Resolves once the executor finishes (or abandons) the job.
pub type OutcomeHandle = oneshot::Receiver<JobOutcome>;

/// A job submission carrying its reply channels.
#[derive(Debug)]
pub struct ExecuteRequest {
    pub job: Job,
    ack_tx: oneshot::Sender<std::result::Result<(), String>>,
    outcome_tx: oneshot::Sender<JobOutcome>,
}

/// The caller-side half of a submission, retrievable before submit.
#[derive(Debug)]
pub struct ExecuteHandle {
    pub ack_rx: oneshot::Receiver<std::result::Result<(), String>>,
    pub outcome_rx: OutcomeHandle,
}

impl ExecuteRequest {
    pub fn new(job: Job) -> (Self, ExecuteHandle) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        (
            Self {
                job,
                ack_tx,
                outcome_tx,
            },
            ExecuteHandle { ack_rx, outcome_rx },
        )
    }

    /// Acknowledge acceptance, taking ownership of the job and the channel
    /// the outcome must eventually be sent on.
    pub fn accept(self) -> (Job, oneshot::Sender<JobOutcome>) {
        let _ = self.ack_tx.send(Ok(()));
        (self.job, self.outcome_tx)
    }

    /// Refuse the job after pickup. The submitter keeps its pending copy.
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.ack_tx.send(Err(reason.into()));
    }
}

/// Cheap, cloneable handle for submitting jobs to an executor.
#[derive(Debug, Clone)]
pub struct ExecutorClient {
    tx: mpsc::Sender<ExecuteRequest>,
    nominal_latency: Duration,
}

impl ExecutorClient {
    pub fn new(tx: mpsc::Sender<ExecuteRequest>, nominal_latency: Duration) -> Self {
        Self {
            tx,
            nominal_latency,
        }
    }

    /// Hand a request to the executor. `false` means it was refused
    /// (queue full or executor gone) and the request was dropped.
    pub fn submit(&self, request: ExecuteRequest) -> bool {
        self.tx.try_send(request).is_ok()
    }

    /// Advertised time for the executor to acknowledge one submission.
    pub fn nominal_latency(&self) -> Duration {
        self.nominal_latency
    }
}

/// Worker pool that executes jobs by running shell commands.
pub struct JobExecutor;

impl JobExecutor {
    /// Spawn the pool and return the client used to feed it.
    pub fn spawn(config: ExecutorConfig) -> ExecutorClient {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..config.workers {
            let rx = rx.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, rx).await;
            });
        }

        ExecutorClient::new(tx, Duration::from_millis(config.nominal_latency_ms))
    }
}

async fn worker_loop(worker_id: usize, rx: Arc<Mutex<mpsc::Receiver<ExecuteRequest>>>) {
    loop {
        let request = { rx.lock().await.recv().await };
        let Some(request) = request else {
            // Submission side closed, pool is shutting down.
            break;
        };

        let (mut job, outcome_tx) = request.accept();
        job.status = JobStatus::Running;
        job.execution_time_seconds = Some(Utc::now().timestamp());

        let outcome = run_job(worker_id, &mut job).await;
        if outcome_tx.send(outcome).is_err() {
            tracing::warn!(job_id = job.id, "Job outcome dropped, queue went away");
        }
    }
}

/// Run each input string as `sh -c <input>`, in order, collecting stdout
/// lines. The first failing command marks the whole job as errored.
async fn run_job(worker_id: usize, job: &mut Job) -> JobOutcome {
    tracing::info!(job_id = job.id, worker_id, commands = job.inputs.len(), "Executing job");

    let mut outputs = Vec::new();
    for command in &job.inputs {
        let result = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                outputs.extend(
                    String::from_utf8_lossy(&output.stdout)
                        .lines()
                        .map(str::to_string),
                );
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                tracing::warn!(
                    job_id = job.id,
                    command = %command,
                    exit_code = ?output.status.code(),
                    stderr = %stderr,
                    "Job command failed"
                );
                job.completion_time_seconds = Some(Utc::now().timestamp());
                return JobOutcome {
                    job_id: job.id,
                    status: JobStatus::Error,
                    payload: OutcomePayload::Outputs(outputs),
                };
            }
            Err(e) => {
                tracing::error!(job_id = job.id, command = %command, error = %e, "Failed to spawn job command");
                job.completion_time_seconds = Some(Utc::now().timestamp());
                return JobOutcome {
                    job_id: job.id,
                    status: JobStatus::Error,
                    payload: OutcomePayload::Outputs(outputs),
                };
            }
        }
    }

    job.completion_time_seconds = Some(Utc::now().timestamp());
    tracing::info!(job_id = job.id, outputs = outputs.len(), "Job completed");

    JobOutcome {
        job_id: job.id,
        status: JobStatus::Complete,
        payload: OutcomePayload::Outputs(outputs),
    }
}
