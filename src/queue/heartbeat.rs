use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::queue::state::QueueInput;

/// Delivers `Heartbeat` inputs into the queue's mailbox on a fixed
/// interval. Heartbeats drive all background work: checkpoint loading
/// during initialisation, result reaping, and dispatch.
pub struct HeartbeatSender {
    interval: Duration,
}

impl HeartbeatSender {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Run until the mailbox closes. A full mailbox drops the beat rather
    /// than queueing it; the next interval supplies another.
    pub async fn run(&self, tx: mpsc::Sender<QueueInput>) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;
            match tx.try_send(QueueInput::Heartbeat) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("Queue mailbox full, skipping heartbeat");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
    }
}
