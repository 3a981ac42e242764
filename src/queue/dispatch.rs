//! The two phases of a dispatch tick: reaping resolved executor handles
//! into the graph, and draining ready jobs out to the executor, both under
//! hard time budgets enforced by the handlers themselves.

use std::collections::HashMap;

use tokio::time::{timeout, Duration, Instant};

use crate::config::TickBudgets;
use crate::executor::{ExecuteRequest, ExecutorClient, JobOutcome, OutcomePayload};
use crate::queue::job::{Job, JobStatus};
use crate::queue::store::{AwaitedJob, Store};

/// Phase 1: probe every outstanding executor handle (bounded wait each)
/// and commit any resolved outcomes to the graph.
///
/// Returns `false` if the deadline passed, in which case the caller must
/// skip dispatch for this tick.
pub async fn process_pending_job_results(
    store: &mut Store,
    budgets: &TickBudgets,
    deadline: Instant,
    paused: bool,
) -> bool {
    let mut ids: Vec<i64> = store.pending_job_results.keys().copied().collect();
    ids.sort_unstable();

    for id in ids {
        if Instant::now() >= deadline {
            return false;
        }
        let Some(awaited) = store.pending_job_results.get_mut(&id) else {
            continue;
        };

        let outcome = match timeout(budgets.poll_timeout, &mut awaited.handle).await {
            Err(_) => continue, // not ready yet
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                // The executor dropped the handle without resolving it.
                // Indistinguishable from a failure, so treat it as one.
                tracing::warn!(job_id = id, "Executor abandoned job");
                JobOutcome {
                    job_id: id,
                    status: JobStatus::Error,
                    payload: OutcomePayload::Outputs(Vec::new()),
                }
            }
        };

        store.pending_job_results.remove(&id);
        tracing::debug!(job_id = id, status = %outcome.status, "Reaped job outcome");
        store.apply_outcome(id, outcome, paused);
    }

    Instant::now() < deadline
}

/// Phase 2: walk `jobs` in sorted order and hand every job matching
/// `criterion` to the executor, within `budget`.
///
/// Accepted jobs move from `jobs` into `results`. Aborts (returning
/// `false`) when the budget would be overrun, the executor refuses a
/// submission, or an acknowledgement comes back as an error; the job in
/// question stays where it was and the next tick retries.
pub async fn timed_job_drain<F>(
    budgets: &TickBudgets,
    budget: Duration,
    jobs: &mut Vec<Job>,
    criterion: F,
    executor: &ExecutorClient,
    results: &mut HashMap<i64, AwaitedJob>,
) -> bool
where
    F: Fn(&Job) -> bool,
{
    let deadline = Instant::now() + budget;
    let wait_time = executor.nominal_latency() * budgets.ack_wait_multiplier;

    let mut i = 0;
    while i < jobs.len() {
        if !criterion(&jobs[i]) {
            i += 1;
            continue;
        }
        let job_id = jobs[i].id;

        if Instant::now() + wait_time > deadline {
            tracing::debug!(job_id, "Drain budget exhausted");
            return false;
        }

        let (request, mut handle) = ExecuteRequest::new(jobs[i].clone());
        if !executor.submit(request) {
            tracing::debug!(job_id, "Executor refused job, retrying next tick");
            return false;
        }

        // The submission is now owned by the executor: wait for the
        // acceptance ack, re-waiting on timeout but never re-submitting.
        let accepted = loop {
            match timeout(wait_time, &mut handle.ack_rx).await {
                Ok(Ok(Ok(()))) => break true,
                Ok(Ok(Err(reason))) => {
                    tracing::warn!(job_id, reason = %reason, "Executor rejected job");
                    break false;
                }
                Ok(Err(_)) => {
                    tracing::warn!(job_id, "Executor dropped job before acknowledging");
                    break false;
                }
                Err(_) => {
                    tracing::debug!(job_id, "Acknowledgement overdue, re-waiting");
                }
            }
        };
        if !accepted {
            return false;
        }

        let mut job = jobs.remove(i);
        job.status = JobStatus::Running;
        tracing::info!(job_id, priority = job.priority, "Dispatched job");
        results.insert(
            job_id,
            AwaitedJob {
                job,
                handle: handle.outcome_rx,
            },
        );
    }

    true
}
