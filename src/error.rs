//! Error types for dockhand.

use thiserror::Error;

use crate::engine::lifecycle::LifecycleError;
use crate::stage::StageError;

/// Dockhand error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine lifecycle error
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),

    /// Stage execution error
    #[error("{0}")]
    Stage(#[from] StageError),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// Usage errors exit 2, missing prerequisites 127, stage failures
    /// propagate the wrapped command's status, and everything else is an
    /// operational failure exiting 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Lifecycle(LifecycleError::InvalidPid(_)) => 2,
            Error::Lifecycle(LifecycleError::MissingPrerequisite(_)) => 127,
            Error::Stage(StageError::Failed { status, .. }) => {
                if *status == 0 {
                    1
                } else {
                    *status
                }
            }
            _ => 1,
        }
    }
}

/// Result type alias for dockhand operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_exits_2() {
        let err = Error::from(LifecycleError::InvalidPid(-1));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_prerequisite_exits_127() {
        let err = Error::from(LifecycleError::MissingPrerequisite("no brew".into()));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_stage_failure_propagates_status() {
        let err = Error::from(StageError::Failed {
            stage: "build".into(),
            attempts: 3,
            status: 42,
        });
        assert_eq!(err.exit_code(), 42);
    }

    #[test]
    fn test_operational_failure_exits_1() {
        let err = Error::from(LifecycleError::Provisioning("socket never appeared".into()));
        assert_eq!(err.exit_code(), 1);
    }
}
