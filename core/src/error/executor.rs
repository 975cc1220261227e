use thiserror::Error;

/// Errors of the execution machinery itself. Task failures are never
/// reported through this type; they end up in a `TaskResult`.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("failed to set up isolated workers: {0}")]
    Spawn(String),
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("sampling failed: {0}")]
    Sample(String),

    #[error("failed to spawn monitor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("no {0} action attached")]
    NoAction(&'static str),

    #[error("{strategy} attempt failed: {reason}")]
    Failed {
        strategy: &'static str,
        reason: String,
    },

    #[error("recovery cancelled by shutdown")]
    Cancelled,
}
