use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{ConductorError, Result};
use crate::queue::job::Job;
use crate::queue::state::{JobQuery, QueueContext, QueueInput, QueueState};
use crate::queue::store::Store;

/// The queue actor: a single task owning the [`Store`], consuming typed
/// inputs from a bounded mailbox one at a time.
pub struct JobQueueService {
    store: Store,
    state: QueueState,
    ctx: QueueContext,
    input_tx: mpsc::Sender<QueueInput>,
}

impl JobQueueService {
    pub fn new(ctx: QueueContext, mailbox_capacity: usize) -> (Self, mpsc::Receiver<QueueInput>) {
        let (input_tx, input_rx) = mpsc::channel(mailbox_capacity);
        let service = Self {
            store: Store::new(),
            state: QueueState::Init,
            ctx,
            input_tx,
        };
        (service, input_rx)
    }

    /// Sender half of the mailbox, for heartbeat generators and clients.
    pub fn input_sender(&self) -> mpsc::Sender<QueueInput> {
        self.input_tx.clone()
    }

    pub fn client(&self) -> QueueClient {
        QueueClient {
            tx: self.input_tx.clone(),
        }
    }

    /// Process inputs until shutdown, then checkpoint one last time.
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<QueueInput>, shutdown: CancellationToken) {
        tracing::info!(state = %self.state, "Job queue service starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.dump_on_shutdown().await;
                    break;
                }
                input = input_rx.recv() => {
                    let Some(input) = input else { break };
                    let next = self.state.step(&mut self.store, &self.ctx, input).await;
                    if next != self.state {
                        tracing::info!(from = %self.state, to = %next, "Queue state transition");
                    }
                    self.state = next;
                }
            }
        }

        tracing::info!("Job queue service stopped");
    }

    async fn dump_on_shutdown(&mut self) {
        tracing::info!("Shutdown requested, checkpointing queue");
        let (reply, rx) = oneshot::channel();
        self.state = self
            .state
            .step(&mut self.store, &self.ctx, QueueInput::Dump { reply })
            .await;
        match rx.await {
            Ok(true) => tracing::info!("Final checkpoint written"),
            _ => tracing::warn!("Final checkpoint failed"),
        }
    }
}

/// Cloneable request/reply handle to a running queue service.
#[derive(Debug, Clone)]
pub struct QueueClient {
    tx: mpsc::Sender<QueueInput>,
}

impl QueueClient {
    pub async fn push(&self, job: Job) -> Result<i64> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueInput::Push { job, reply })
            .await
            .map_err(|_| ConductorError::ServiceUnavailable)?;
        rx.await.map_err(|_| ConductorError::ServiceUnavailable)?
    }

    pub async fn query(&self, query: JobQuery) -> Result<Vec<Job>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueInput::Query { query, reply })
            .await
            .map_err(|_| ConductorError::ServiceUnavailable)?;
        rx.await.map_err(|_| ConductorError::ServiceUnavailable)?
    }

    pub async fn toggle_pause(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueInput::TogglePause { reply })
            .await
            .map_err(|_| ConductorError::ServiceUnavailable)?;
        rx.await.map_err(|_| ConductorError::ServiceUnavailable)?
    }

    pub async fn dump(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueInput::Dump { reply })
            .await
            .map_err(|_| ConductorError::ServiceUnavailable)?;
        rx.await.map_err(|_| ConductorError::ServiceUnavailable)
    }
}
