use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};

use chrono::Utc;

use crate::database::{LoadHandle, QueueData};
use crate::error::{ConductorError, Result};
use crate::executor::{JobOutcome, OutcomeHandle, OutcomePayload};
use crate::queue::job::{Job, JobStatus};

/// A dispatched job: the record retained for checkpointing plus the
/// outstanding executor handle.
#[derive(Debug)]
pub struct AwaitedJob {
    pub job: Job,
    pub handle: OutcomeHandle,
}

/// The queue's in-memory state. Owned exclusively by the service task;
/// the sub-counter is atomic only as a guard against future sharing.
#[derive(Debug, Default)]
pub struct Store {
    pub sub_counter: AtomicU8,
    /// Registered jobs whose outcome has not been committed, sorted by
    /// [`compare_jobs`].
    pub pending_jobs: Vec<Job>,
    /// Jobs held by the executor, keyed by id.
    pub pending_job_results: HashMap<i64, AwaitedJob>,
    /// Outstanding database load during initialisation.
    pub pending_init_load: Option<LoadHandle>,
    /// Previously in-flight jobs to re-submit after a checkpoint load.
    pub pending_init_execs: Vec<Job>,
}

/// Pairwise ordering for the pending set: a dependency edge always wins
/// over priority, so a blocker sits ahead of its dependents even when the
/// dependent is more urgent. Then lower priority value, fewer blockers,
/// lower id.
pub fn compare_jobs(a: &Job, b: &Job) -> Ordering {
    if a.depends_on(b.id) {
        return Ordering::Greater;
    }
    if b.depends_on(a.id) {
        return Ordering::Less;
    }
    match a.priority.cmp(&b.priority) {
        Ordering::Equal => {}
        ord => return ord,
    }
    match a.num_blockers().cmp(&b.num_blockers()) {
        Ordering::Equal => {}
        ord => return ord,
    }
    a.id.cmp(&b.id)
}

/// Detect a mutual blocker edge between a candidate job (about to receive
/// `candidate_id`) and any already-pending job. Such a pair has no valid
/// order and would wedge both jobs forever.
pub fn find_mutual_edge(candidate: &Job, candidate_id: i64, pending: &[Job]) -> Option<i64> {
    pending
        .iter()
        .find(|other| candidate.depends_on(other.id) && other.depends_on(candidate_id))
        .map(|other| other.id)
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next job id: milliseconds since the epoch times 1000 plus
    /// the wrapping sub-counter, which disambiguates ids minted within the
    /// same millisecond (up to 256 of them).
    pub fn mint_job_id(&self) -> i64 {
        let millis = Utc::now().timestamp_millis();
        let sub = self.sub_counter.fetch_add(1, AtomicOrdering::Relaxed);
        millis * 1000 + i64::from(sub)
    }

    /// Assign an id and initial status to `job` and insert it into the
    /// pending set.
    ///
    /// # Panics
    ///
    /// A minted id colliding with a live job means the wall clock went
    /// backwards or more than 256 ids were minted in one millisecond;
    /// either way the uniqueness invariant is gone and we abort.
    pub fn add_and_register_new_job(&mut self, mut job: Job, paused: bool) -> Result<i64> {
        let id = self.mint_job_id();

        if let Some(other) = find_mutual_edge(&job, id, &self.pending_jobs) {
            return Err(ConductorError::MutualBlockers(other, id));
        }
        if self.pending_jobs.iter().any(|j| j.id == id) || self.pending_job_results.contains_key(&id)
        {
            panic!("duplicate job id {id}: clock fault or sub-counter exhaustion");
        }

        job.id = id;
        job.spawn_time_seconds = Utc::now().timestamp();
        job.pre_pause_status = if job.num_blockers() == 0 {
            JobStatus::Queued
        } else {
            JobStatus::Blocked
        };
        job.status = if paused {
            JobStatus::Paused
        } else {
            job.pre_pause_status
        };

        tracing::debug!(
            job_id = id,
            priority = job.priority,
            blockers = job.num_blockers(),
            status = %job.status,
            "Registered job"
        );

        self.pending_jobs.push(job);
        self.sort_jobs();
        Ok(id)
    }

    /// Restore the sort order after a mutation.
    ///
    /// The relation is not transitive once dependency edges mix with
    /// priorities, so this is a stable insertion pass over the pairwise
    /// comparator rather than `sort_by` (which demands a total order and
    /// may panic without one).
    pub fn sort_jobs(&mut self) {
        for i in 1..self.pending_jobs.len() {
            let mut j = i;
            while j > 0 && compare_jobs(&self.pending_jobs[j], &self.pending_jobs[j - 1]) == Ordering::Less
            {
                self.pending_jobs.swap(j, j - 1);
                j -= 1;
            }
        }
    }

    /// Commit a resolved executor outcome to the graph. `paused` carries
    /// the queue's current pause state into any child registration.
    pub fn apply_outcome(&mut self, completed_id: i64, outcome: JobOutcome, paused: bool) {
        if outcome.status == JobStatus::Error {
            // Terminal: dependents are cancelled and keep their blocker
            // entries, so they stay visible to queries but never dispatch.
            for job in &mut self.pending_jobs {
                if job.depends_on(completed_id) {
                    tracing::info!(job_id = job.id, blocker = completed_id, "Cancelling dependent of failed job");
                    if job.status == JobStatus::Paused {
                        job.pre_pause_status = JobStatus::Canceled;
                    } else {
                        job.status = JobStatus::Canceled;
                    }
                }
            }
            return;
        }

        match outcome.payload {
            OutcomePayload::Outputs(outputs) => {
                for job in &mut self.pending_jobs {
                    job.independent_blockers.retain(|&b| b != completed_id);
                    let had_relevant = job.relevant_blockers.contains(&completed_id);
                    job.relevant_blockers.retain(|&b| b != completed_id);
                    if had_relevant {
                        job.inputs.extend(outputs.iter().cloned());
                    }
                    refresh_unblocked(job);
                }
            }
            OutcomePayload::Children(children) => {
                // The completed job expands into its children; dependents
                // wait on those instead.
                let mut child_ids = Vec::with_capacity(children.len());
                for child in children {
                    match self.add_and_register_new_job(child, paused) {
                        Ok(id) => child_ids.push(id),
                        Err(e) => {
                            tracing::warn!(parent = completed_id, error = %e, "Rejected child job")
                        }
                    }
                }
                for job in &mut self.pending_jobs {
                    splice_blockers(&mut job.independent_blockers, completed_id, &child_ids);
                    splice_blockers(&mut job.relevant_blockers, completed_id, &child_ids);
                    refresh_unblocked(job);
                }
            }
        }

        self.sort_jobs();
    }

    /// Save each pending job's status and set it to `Paused`.
    pub fn pause_jobs(&mut self) {
        for job in &mut self.pending_jobs {
            job.pre_pause_status = job.status;
            job.status = JobStatus::Paused;
        }
    }

    /// Restore every pending job to its pre-pause status.
    pub fn unpause_jobs(&mut self) {
        for job in &mut self.pending_jobs {
            job.status = job.pre_pause_status;
        }
    }

    pub fn query_all(&self) -> Vec<Job> {
        self.pending_jobs.clone()
    }

    pub fn query_at_priority(&self, priority: i64) -> Vec<Job> {
        self.pending_jobs
            .iter()
            .filter(|j| j.priority == priority)
            .cloned()
            .collect()
    }

    /// Snapshot for the database: pending jobs plus the retained records
    /// of everything the executor currently holds.
    pub fn checkpoint_data(&self) -> QueueData {
        let mut awaited_jobs: Vec<Job> = self
            .pending_job_results
            .values()
            .map(|awaited| awaited.job.clone())
            .collect();
        awaited_jobs.sort_by_key(|j| j.id);

        QueueData {
            pending_jobs: self.pending_jobs.clone(),
            awaited_jobs,
        }
    }
}

/// Replace `completed_id` with the ids of its children, preserving the
/// append order of the outcome.
fn splice_blockers(blockers: &mut Vec<i64>, completed_id: i64, child_ids: &[i64]) {
    let before = blockers.len();
    blockers.retain(|&b| b != completed_id);
    if blockers.len() < before {
        blockers.extend_from_slice(child_ids);
    }
}

/// Move a job whose last blocker just cleared into the runnable status,
/// respecting an active pause.
fn refresh_unblocked(job: &mut Job) {
    if job.num_blockers() > 0 {
        return;
    }
    if job.status == JobStatus::Blocked {
        job.status = JobStatus::Queued;
    }
    if job.status == JobStatus::Paused && job.pre_pause_status == JobStatus::Blocked {
        job.pre_pause_status = JobStatus::Queued;
    }
}
