//! Durable checkpoint storage for the job queue.
//!
//! Request/response actor over a bounded channel. The concrete
//! [`JobDatabase`] persists a JSON snapshot of the queue's pending and
//! awaited jobs to a single file, written via temp-file + rename so a
//! crash mid-dump never corrupts the previous checkpoint.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ConductorError, Result};
use crate::queue::job::Job;

/// The durable record: jobs not yet dispatched plus jobs that were held by
/// the executor when the checkpoint was taken (re-submitted on recovery).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueData {
    pub pending_jobs: Vec<Job>,
    pub awaited_jobs: Vec<Job>,
}

impl QueueData {
    pub fn awaited_job_ids(&self) -> Vec<i64> {
        self.awaited_jobs.iter().map(|j| j.id).collect()
    }
}

#[derive(Debug)]
pub enum DatabaseRequest {
    Load {
        reply: oneshot::Sender<Result<QueueData>>,
    },
    Dump {
        data: QueueData,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// Resolves with the loaded checkpoint, or an error if the database is
/// unreachable or the snapshot unreadable.
pub type LoadHandle = oneshot::Receiver<Result<QueueData>>;
pub type DumpHandle = oneshot::Receiver<Result<bool>>;

#[derive(Debug, Clone)]
pub struct DatabaseClient {
    tx: mpsc::Sender<DatabaseRequest>,
}

impl DatabaseClient {
    pub fn new(tx: mpsc::Sender<DatabaseRequest>) -> Self {
        Self { tx }
    }

    /// Fire a load request and return the handle to poll. If the database
    /// is gone the handle resolves to a receive error at the first poll.
    pub fn load(&self) -> LoadHandle {
        let (reply, rx) = oneshot::channel();
        if let Err(e) = self.tx.try_send(DatabaseRequest::Load { reply }) {
            tracing::error!(error = %e, "Failed to reach job database");
        }
        rx
    }

    pub fn dump(&self, data: QueueData) -> DumpHandle {
        let (reply, rx) = oneshot::channel();
        if let Err(e) = self.tx.try_send(DatabaseRequest::Dump { data, reply }) {
            tracing::error!(error = %e, "Failed to reach job database");
        }
        rx
    }
}

/// File-backed checkpoint store.
pub struct JobDatabase {
    path: PathBuf,
}

impl JobDatabase {
    pub fn spawn(path: impl Into<PathBuf>) -> DatabaseClient {
        let (tx, rx) = mpsc::channel(16);
        let database = Self { path: path.into() };
        tokio::spawn(async move {
            database.run(rx).await;
        });
        DatabaseClient::new(tx)
    }

    async fn run(self, mut rx: mpsc::Receiver<DatabaseRequest>) {
        while let Some(request) = rx.recv().await {
            match request {
                DatabaseRequest::Load { reply } => {
                    let _ = reply.send(self.load_checkpoint());
                }
                DatabaseRequest::Dump { data, reply } => {
                    let _ = reply.send(self.write_checkpoint(&data));
                }
            }
        }
    }

    fn load_checkpoint(&self) -> Result<QueueData> {
        if !self.path.exists() {
            // First boot: nothing durable yet.
            tracing::info!(path = %self.path.display(), "No checkpoint found, starting empty");
            return Ok(QueueData::default());
        }

        let bytes = std::fs::read(&self.path)
            .map_err(|e| ConductorError::Checkpoint(e.to_string()))?;
        let data: QueueData = serde_json::from_slice(&bytes)
            .map_err(|e| ConductorError::Checkpoint(e.to_string()))?;

        tracing::info!(
            path = %self.path.display(),
            pending = data.pending_jobs.len(),
            awaited = data.awaited_jobs.len(),
            "Loaded queue checkpoint"
        );
        Ok(data)
    }

    fn write_checkpoint(&self, data: &QueueData) -> Result<bool> {
        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| ConductorError::Checkpoint(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| ConductorError::Checkpoint(e.to_string()))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ConductorError::Checkpoint(e.to_string()))?;

        tracing::info!(
            path = %self.path.display(),
            pending = data.pending_jobs.len(),
            awaited = data.awaited_jobs.len(),
            "Wrote queue checkpoint"
        );
        Ok(true)
    }
}
