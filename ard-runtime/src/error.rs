use thiserror::Error;

/// Runtime failures. `Panic` carries the source location when the
/// panic originated from a `panic(..)` call site.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Panic: {message} (at {line}:{column})")]
    Panic {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("Panic: {0}")]
    Fault(String),
    #[error("Package '{0}' is not available in this runtime")]
    PackageUnavailable(String),
    #[error("Extern binding '{0}' is not available in this runtime")]
    ExternUnavailable(String),
    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn fault(message: impl Into<String>) -> Self {
        RuntimeError::Fault(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal(message.into())
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::Internal(_) => 3,
            _ => 1,
        }
    }
}
