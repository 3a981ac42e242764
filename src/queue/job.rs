use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Invalid,
    Queued,
    Blocked,
    Paused,
    Running,
    Complete,
    Error,
    Canceled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Invalid => write!(f, "invalid"),
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Blocked => write!(f, "blocked"),
            JobStatus::Paused => write!(f, "paused"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// A node in the dependency graph.
///
/// Jobs are submitted without an id; the queue assigns one at registration
/// (`millis since epoch * 1000 + sub-counter`, so ids are time-ordered).
/// Blocker lists name jobs that must complete first: *independent* blockers
/// gate execution only, while *relevant* blockers additionally feed their
/// outputs into this job's `inputs` when they complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub priority: i64,
    pub status: JobStatus,
    pub pre_pause_status: JobStatus,
    pub spawn_time_seconds: i64,
    pub execution_time_seconds: Option<i64>,
    pub completion_time_seconds: Option<i64>,
    pub independent_blockers: Vec<i64>,
    pub relevant_blockers: Vec<i64>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Job {
    pub fn new(
        priority: i64,
        independent_blockers: Vec<i64>,
        relevant_blockers: Vec<i64>,
        inputs: Vec<String>,
    ) -> Self {
        Self {
            id: 0,
            priority,
            status: JobStatus::Invalid,
            pre_pause_status: JobStatus::Invalid,
            spawn_time_seconds: 0,
            execution_time_seconds: None,
            completion_time_seconds: None,
            independent_blockers,
            relevant_blockers,
            inputs,
            outputs: Vec::new(),
        }
    }

    pub fn num_blockers(&self) -> usize {
        self.independent_blockers.len() + self.relevant_blockers.len()
    }

    /// True if `id` appears in either blocker list.
    pub fn depends_on(&self, id: i64) -> bool {
        self.independent_blockers.contains(&id) || self.relevant_blockers.contains(&id)
    }
}
