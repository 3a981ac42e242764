//! The dependency-ordered job queue: store, lifecycle state machine,
//! budgeted dispatch, and the actor service that ties them together.
//!
//! # Components
//!
//! - [`job::Job`]: the graph node, with priority and blocker edges
//! - [`store::Store`]: the pending set and the graph-mutation rules
//! - [`state::QueueState`]: per-state input handlers
//! - [`dispatch`]: heartbeat phases (reap completions, drain ready jobs)
//! - [`service::JobQueueService`]: the mailbox loop owning everything
//! - [`heartbeat::HeartbeatSender`]: the tick generator

pub mod dispatch;
pub mod heartbeat;
pub mod job;
pub mod service;
pub mod state;
pub mod store;

pub use job::{Job, JobStatus};
pub use service::{JobQueueService, QueueClient};
pub use state::{JobQuery, QueueContext, QueueInput, QueueState};
pub use store::Store;
