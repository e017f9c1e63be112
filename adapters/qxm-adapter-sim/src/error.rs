//! Simulator errors.

use qxm_runtime::ManagerError;
use thiserror::Error;

/// Errors raised inside the statevector backend.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("{requested} qubits requested, simulator holds at most {max}")]
    CapacityExceeded { requested: usize, max: usize },

    #[error("statevector backend only simulates qubits, got {0} levels")]
    UnsupportedLevels(usize),

    #[error("qudit id {0} is not allocated on this backend")]
    UnknownQubit(usize),

    #[error("invalid initial state: {0}")]
    InvalidState(String),

    #[error("channel '{name}' does not act on {targets} qubit(s)")]
    ChannelShape { name: String, targets: usize },
}

impl From<SimError> for ManagerError {
    fn from(err: SimError) -> Self {
        match err {
            SimError::CapacityExceeded { .. } => ManagerError::ResourceExhaustion(err.to_string()),
            SimError::UnsupportedLevels(_) => ManagerError::Unsupported(err.to_string()),
            _ => ManagerError::Backend(err.to_string()),
        }
    }
}
