//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Every variant except the record errors signals a caller bug: the data
/// structures of this crate are total for well-formed input, so these errors
/// are surfaced immediately and never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// The capacity of a sum tree (or of a prioritized buffer) is not a power of two.
    #[error("Capacity must be a nonzero power of two, got {0}")]
    InvalidCapacity(usize),

    /// A priority is negative or not a number.
    #[error("Priority must be nonnegative, got {0}")]
    InvalidPriority(f32),

    /// Sampling was requested from a sum tree whose total priority is zero.
    #[error("Cannot sample from a distribution with zero total priority")]
    EmptyDistribution,

    /// A trajectory window would hold more than `n_steps` unemitted actions.
    #[error("Trajectory window exceeded its horizon of {n_steps} steps")]
    CapacityExceeded {
        /// The configured step horizon.
        n_steps: usize,
    },

    /// A transition was requested from an empty trajectory window.
    #[error("Trajectory window is empty")]
    Underflow,

    /// Malformed request or configuration.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}

impl RelayError {
    /// Shorthand for [`RelayError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
