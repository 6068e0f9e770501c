//! Crate-wide error type.
//!
//! Only programming-error preconditions are modeled as `Result` errors
//! here. Recoverable channel contention, temporal exhaustion and (m,k)
//! violations are state transitions and trace signals, not errors: a
//! backoff freeze isn't a failure the caller needs to handle.

use core::fmt;

/// Fatal precondition violations. The implementation refuses to run
/// rather than degrade silently.
#[derive(Debug, Clone, PartialEq)]
pub enum CsmaError {
    /// A priority value outside `0..8` was supplied.
    PriorityOutOfRange(u8),
}

impl fmt::Display for CsmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsmaError::PriorityOutOfRange(p) => {
                write!(f, "priority {} out of range 0..8", p)
            }
        }
    }
}

impl std::error::Error for CsmaError {}
