use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Time budgets governing the heartbeat-driven dispatch loop.
///
/// These are policy knobs, not invariants. Tests inject tighter values to
/// exercise the budget checks without waiting out the production defaults.
#[derive(Debug, Clone)]
pub struct TickBudgets {
    /// Overall budget for one Running-state heartbeat (reap + dispatch).
    pub tick_budget: Duration,
    /// Budget for one re-submission pass while recovering awaited jobs.
    pub init_drain_budget: Duration,
    /// The executor acknowledgement wait is this multiple of its nominal latency.
    pub ack_wait_multiplier: u32,
    /// Bounded wait when probing an outstanding future.
    pub poll_timeout: Duration,
}

impl Default for TickBudgets {
    fn default() -> Self {
        Self {
            tick_budget: Duration::from_millis(900),
            init_drain_budget: Duration::from_millis(950),
            ack_wait_multiplier: 4,
            poll_timeout: Duration::from_millis(1),
        }
    }
}

/// Sizing for the executor worker pool.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Jobs the executor will hold before refusing submissions.
    pub queue_capacity: usize,
    /// Concurrent worker tasks.
    pub workers: usize,
    /// Advertised per-submission latency, used by the queue to bound its waits.
    pub nominal_latency_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: 4,
            nominal_latency_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConductorConfig {
    pub listen_addr: SocketAddr,
    pub num_allowed_threads: usize,
    pub checkpoint_path: PathBuf,
    pub heartbeat_interval_ms: u64,
    pub mailbox_capacity: usize,
    pub budgets: TickBudgets,
    pub executor: ExecutorConfig,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4444".parse().unwrap(),
            num_allowed_threads: 4,
            checkpoint_path: PathBuf::from("conductor-queue.json"),
            heartbeat_interval_ms: 1000,
            mailbox_capacity: 100,
            budgets: TickBudgets::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl ConductorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = path.into();
        self
    }
}
