use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("queue is initialising")]
    Initialising,

    #[error("jobs {0} and {1} list each other as blockers")]
    MutualBlockers(i64, i64),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("queue service unavailable")]
    ServiceUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ConductorError>;
