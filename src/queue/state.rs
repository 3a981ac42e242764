//! The queue lifecycle state machine.
//!
//! States carry no data of their own; all context lives in the
//! [`Store`], so a transition is nothing more than returning the next
//! state. Exactly one handler runs at a time and has exclusive access to
//! the store for its duration.
//!
//! ```text
//! Init --HB--> InitWait --HB(load ready)--> InitFinalWait --HB(drained)--> Running
//!                       \--HB(load ready, nothing in flight)------------> Running
//! Running --TogglePause--> Paused --TogglePause--> Running
//! ```

use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};

use crate::config::TickBudgets;
use crate::database::DatabaseClient;
use crate::error::{ConductorError, Result};
use crate::executor::ExecutorClient;
use crate::queue::dispatch::{process_pending_job_results, timed_job_drain};
use crate::queue::job::{Job, JobStatus};
use crate::queue::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Init,
    InitWait,
    InitFinalWait,
    Running,
    Paused,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Init => write!(f, "init"),
            QueueState::InitWait => write!(f, "init-wait"),
            QueueState::InitFinalWait => write!(f, "init-final-wait"),
            QueueState::Running => write!(f, "running"),
            QueueState::Paused => write!(f, "paused"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobQuery {
    All,
    AtPriority(i64),
}

/// A typed input delivered through the queue's mailbox, carrying its
/// reply channel where one is due.
#[derive(Debug)]
pub enum QueueInput {
    Heartbeat,
    Push {
        job: Job,
        reply: oneshot::Sender<Result<i64>>,
    },
    Query {
        query: JobQuery,
        reply: oneshot::Sender<Result<Vec<Job>>>,
    },
    TogglePause {
        reply: oneshot::Sender<Result<bool>>,
    },
    Dump {
        reply: oneshot::Sender<bool>,
    },
}

/// Collaborator handles and policy knobs shared by every handler.
#[derive(Debug, Clone)]
pub struct QueueContext {
    pub executor: ExecutorClient,
    pub database: DatabaseClient,
    pub budgets: TickBudgets,
}

impl QueueState {
    /// Handle one input: mutate the store, answer the caller if a reply is
    /// due, and return the next state.
    pub async fn step(self, store: &mut Store, ctx: &QueueContext, input: QueueInput) -> QueueState {
        match self {
            QueueState::Init => step_init(store, ctx, input).await,
            QueueState::InitWait => step_init_wait(store, ctx, input).await,
            QueueState::InitFinalWait => step_init_final_wait(store, ctx, input).await,
            QueueState::Running => step_running(store, ctx, input).await,
            QueueState::Paused => step_paused(store, ctx, input).await,
        }
    }
}

async fn step_init(store: &mut Store, ctx: &QueueContext, input: QueueInput) -> QueueState {
    match input {
        QueueInput::Heartbeat => {
            store.pending_init_load = Some(ctx.database.load());
            QueueState::InitWait
        }
        other => reject_while_initialising(other, QueueState::Init),
    }
}

async fn step_init_wait(store: &mut Store, ctx: &QueueContext, input: QueueInput) -> QueueState {
    match input {
        QueueInput::Heartbeat => {
            let Some(mut handle) = store.pending_init_load.take() else {
                tracing::warn!("No outstanding checkpoint load, entering running state");
                return QueueState::Running;
            };

            match timeout(ctx.budgets.poll_timeout, &mut handle).await {
                Err(_) => {
                    // Not ready; keep waiting on the same handle.
                    store.pending_init_load = Some(handle);
                    QueueState::InitWait
                }
                Ok(Err(_)) => {
                    tracing::error!("Job database went away during load, starting empty");
                    QueueState::Running
                }
                Ok(Ok(Err(e))) => {
                    // The durable record is still on disk; an operator can
                    // re-submit, so fall forward rather than wedge.
                    tracing::error!(error = %e, "Failed to load checkpoint, starting empty");
                    QueueState::Running
                }
                Ok(Ok(Ok(data))) => {
                    store.pending_jobs = data.pending_jobs;
                    for job in &mut store.pending_jobs {
                        // The queue always restarts into Running; a pause
                        // taken before the dump does not survive it.
                        if job.status == JobStatus::Paused {
                            job.status = job.pre_pause_status;
                        }
                    }
                    store.sort_jobs();

                    if data.awaited_jobs.is_empty() {
                        tracing::info!(pending = store.pending_jobs.len(), "Recovery complete");
                        QueueState::Running
                    } else {
                        tracing::info!(
                            pending = store.pending_jobs.len(),
                            awaited = data.awaited_jobs.len(),
                            "Checkpoint loaded, re-submitting in-flight jobs"
                        );
                        store.pending_init_execs = data.awaited_jobs;
                        QueueState::InitFinalWait
                    }
                }
            }
        }
        other => reject_while_initialising(other, QueueState::InitWait),
    }
}

async fn step_init_final_wait(
    store: &mut Store,
    ctx: &QueueContext,
    input: QueueInput,
) -> QueueState {
    match input {
        QueueInput::Heartbeat => {
            timed_job_drain(
                &ctx.budgets,
                ctx.budgets.init_drain_budget,
                &mut store.pending_init_execs,
                |_| true,
                &ctx.executor,
                &mut store.pending_job_results,
            )
            .await;

            if store.pending_init_execs.is_empty() {
                tracing::info!(
                    awaited = store.pending_job_results.len(),
                    "In-flight jobs re-submitted, recovery complete"
                );
                QueueState::Running
            } else {
                QueueState::InitFinalWait
            }
        }
        other => reject_while_initialising(other, QueueState::InitFinalWait),
    }
}

async fn step_running(store: &mut Store, ctx: &QueueContext, input: QueueInput) -> QueueState {
    match input {
        QueueInput::Heartbeat => {
            let deadline = Instant::now() + ctx.budgets.tick_budget;
            if !process_pending_job_results(store, &ctx.budgets, deadline, false).await {
                // Reaping ate the whole tick; dispatch waits for the next one.
                return QueueState::Running;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            timed_job_drain(
                &ctx.budgets,
                remaining,
                &mut store.pending_jobs,
                |job| job.num_blockers() == 0,
                &ctx.executor,
                &mut store.pending_job_results,
            )
            .await;
            QueueState::Running
        }
        QueueInput::Push { job, reply } => {
            let _ = reply.send(store.add_and_register_new_job(job, false));
            QueueState::Running
        }
        QueueInput::Query { query, reply } => {
            let _ = reply.send(Ok(run_query(store, query)));
            QueueState::Running
        }
        QueueInput::TogglePause { reply } => {
            store.pause_jobs();
            tracing::info!("Queue paused");
            let _ = reply.send(Ok(true));
            QueueState::Paused
        }
        QueueInput::Dump { reply } => {
            handle_dump(store, ctx, reply).await;
            QueueState::Running
        }
    }
}

async fn step_paused(store: &mut Store, ctx: &QueueContext, input: QueueInput) -> QueueState {
    match input {
        QueueInput::Heartbeat => {
            // Completions still land while paused; nothing new goes out.
            let deadline = Instant::now() + ctx.budgets.tick_budget;
            process_pending_job_results(store, &ctx.budgets, deadline, true).await;
            QueueState::Paused
        }
        QueueInput::Push { job, reply } => {
            let _ = reply.send(store.add_and_register_new_job(job, true));
            QueueState::Paused
        }
        QueueInput::Query { query, reply } => {
            let _ = reply.send(Ok(run_query(store, query)));
            QueueState::Paused
        }
        QueueInput::TogglePause { reply } => {
            store.unpause_jobs();
            tracing::info!("Queue unpaused");
            let _ = reply.send(Ok(true));
            QueueState::Running
        }
        QueueInput::Dump { reply } => {
            handle_dump(store, ctx, reply).await;
            QueueState::Paused
        }
    }
}

fn run_query(store: &Store, query: JobQuery) -> Vec<Job> {
    match query {
        JobQuery::All => store.query_all(),
        JobQuery::AtPriority(priority) => store.query_at_priority(priority),
    }
}

/// Serialise the store to the database and block on its acknowledgement.
/// Dump is a shutdown-path operation, so the unbounded wait is acceptable.
async fn handle_dump(store: &mut Store, ctx: &QueueContext, reply: oneshot::Sender<bool>) {
    let handle = ctx.database.dump(store.checkpoint_data());
    let ok = match handle.await {
        Ok(Ok(ok)) => ok,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Checkpoint dump failed");
            false
        }
        Err(_) => {
            tracing::error!("Job database went away during dump");
            false
        }
    };
    let _ = reply.send(ok);
}

/// Init-family states accept heartbeats and vacuous dumps only; the
/// durable record predating this process is still authoritative, so a
/// dump succeeds with no side effects.
fn reject_while_initialising(input: QueueInput, state: QueueState) -> QueueState {
    match input {
        QueueInput::Heartbeat => unreachable!("heartbeats are handled per state"),
        QueueInput::Push { reply, .. } => {
            let _ = reply.send(Err(ConductorError::Initialising));
        }
        QueueInput::Query { reply, .. } => {
            let _ = reply.send(Err(ConductorError::Initialising));
        }
        QueueInput::TogglePause { reply } => {
            let _ = reply.send(Err(ConductorError::Initialising));
        }
        QueueInput::Dump { reply } => {
            let _ = reply.send(true);
        }
    }
    state
}
