//! Error types for the execution manager.

use qxm_ir::IrError;
use thiserror::Error;

/// Errors surfaced by the execution manager and its backends.
///
/// None of these are retried. A [`ManagerError::ProtocolViolation`] is a bug
/// in the calling kernel code and is expected to abort the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManagerError {
    /// The caller broke an invariant of the execution-manager contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// An instruction named an operation that is neither built in nor
    /// registered.
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    /// A backend ran out of capacity.
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// No execution manager could be resolved on this thread.
    #[error("No execution manager registered: {0}")]
    NoExecutionManager(String),

    /// The backend does not support the request.
    #[error("Unsupported by backend: {0}")]
    Unsupported(String),

    /// Generic backend failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid IR value.
    #[error(transparent)]
    Ir(#[from] IrError),
}

impl ManagerError {
    /// Shorthand for a protocol violation.
    pub fn protocol(msg: impl Into<String>) -> Self {
        ManagerError::ProtocolViolation(msg.into())
    }

    /// True if this is a protocol violation.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ManagerError::ProtocolViolation(_))
    }
}

/// Result type for execution-manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
