//! Error types for the IR crate.

use thiserror::Error;

/// Errors raised while constructing or validating IR values.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// A Pauli word contained a character other than I, X, Y or Z.
    #[error("Invalid Pauli character '{0}'")]
    InvalidPauli(char),

    /// A Kraus channel failed validation.
    #[error("Invalid Kraus channel '{name}': {reason}")]
    InvalidChannel {
        /// Name of the channel.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A probability or damping parameter was outside `[0, 1]`.
    #[error("Parameter '{name}' must lie in [0, 1], got {value}")]
    ProbabilityOutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Matrix or word size did not match the operand count.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected size.
        expected: usize,
        /// Actual size.
        got: usize,
    },
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
