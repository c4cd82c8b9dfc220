use thiserror::Error;

/// Everything that can stop a check before it produces a status.  All of
/// these map to the UNKNOWN exit code: the check could not determine
/// mailbox health, which is distinct from the mailbox being unhealthy.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("invalid threshold range '{0}'")]
    InvalidThreshold(String),
    #[error("at least one of --warning/--critical must be supplied")]
    MissingThreshold,
    #[error("connection to '{0}' failed")]
    Connection(String),
    #[error("check timed out after {0} seconds")]
    Timeout(u64),
}
