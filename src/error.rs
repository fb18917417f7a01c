//! Engine Error Types
//!
//! Every fallible engine operation returns [`FlowResult`]. The orchestrator
//! turns these errors into a structured [`Outcome`](crate::execution::Outcome)
//! at its boundary; nothing below it panics on bad data.

use thiserror::Error;

/// Errors raised while preparing, dispatching, or advancing a flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// An id does not resolve to a definition or instance.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Caller supplied a non-positive or malformed value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Definitions or instance state are not usable as stored.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// No handler is registered for a step kind.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A step handler reported a failure.
    #[error("step {step_id} failed: {reason}")]
    StepFailed { step_id: i64, reason: String },

    /// Persistence or other unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Shorthand for [`FlowError::NotFound`].
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Returns true for errors whose text may be shown to the caller.
    ///
    /// Everything else is logged in full and reported generically.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidInput(_) | Self::InvalidState(_)
        )
    }

    /// Returns true for failures raised by step dispatch.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, Self::StepFailed { .. } | Self::Unsupported(_))
    }
}

/// Result alias used across the engine.
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = FlowError::not_found("sequence", 7);
        assert_eq!(err.to_string(), "sequence 7 not found");
    }

    #[test]
    fn test_caller_visibility() {
        assert!(FlowError::not_found("step", 1).is_caller_visible());
        assert!(FlowError::InvalidInput("x".into()).is_caller_visible());
        assert!(FlowError::InvalidState("x".into()).is_caller_visible());
        assert!(!FlowError::Internal("db down".into()).is_caller_visible());
        assert!(!FlowError::Unsupported("kind".into()).is_caller_visible());
    }

    #[test]
    fn test_dispatch_failure_classification() {
        let failed = FlowError::StepFailed {
            step_id: 3,
            reason: "smtp timeout".into(),
        };
        assert!(failed.is_dispatch_failure());
        assert!(FlowError::Unsupported("x".into()).is_dispatch_failure());
        assert!(!FlowError::Internal("x".into()).is_dispatch_failure());
        assert!(failed.to_string().contains("smtp timeout"));
    }
}
