//! Error types for ouroboros-harness
//!
//! Two families live here:
//! - [`HarnessError`]: precondition/structural errors returned to the caller of
//!   `launch_test_suite`, `reset_test_suite` and `reset_tests`.
//! - [`SharedError`] / [`PanicError`] / [`CancelledError`]: execution errors captured on a
//!   test and never returned out of a protocol call.

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Execution error stored on a test.
///
/// Shared so the same error can be handed to listeners and to `Test::error()`.
pub type SharedError = Arc<anyhow::Error>;

/// Precondition and structural errors
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{owner} is already running")]
    AlreadyRunning { owner: String },

    #[error("Suite {suite} cannot be executed: {reason}")]
    CannotExecute { suite: String, reason: String },

    #[error("Suite {suite} launch failed: {source}")]
    Launch {
        suite: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HarnessError {
    /// Returns true if this error comes from the running guard
    pub fn is_already_running(&self) -> bool {
        matches!(self, HarnessError::AlreadyRunning { .. })
    }

    /// Returns true if this error comes from the eligibility hook
    pub fn is_cannot_execute(&self) -> bool {
        matches!(self, HarnessError::CannotExecute { .. })
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// A test run whose future was dropped before it completed (timeout, `select!`, abort)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Test run was cancelled before completion")]
pub struct CancelledError;

/// A panic raised inside a test callback, normalized into an error value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Callback panicked: {message}")]
pub struct PanicError {
    pub message: String,
}

impl PanicError {
    /// Build from a `catch_unwind` payload
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_normalization() {
        let err = PanicError::from_payload(Box::new("boom"));
        assert_eq!(err.message, "boom");

        let err = PanicError::from_payload(Box::new(String::from("owned boom")));
        assert_eq!(err.message, "owned boom");

        let err = PanicError::from_payload(Box::new(42_u32));
        assert_eq!(err.message, "non-string panic payload");
    }

    #[test]
    fn test_harness_error_predicates() {
        let err = HarnessError::AlreadyRunning { owner: "suite".to_string() };
        assert!(err.is_already_running());
        assert!(!err.is_cannot_execute());
        assert_eq!(err.to_string(), "suite is already running");

        let err = HarnessError::CannotExecute {
            suite: "maps".to_string(),
            reason: "missing api key".to_string(),
        };
        assert!(err.is_cannot_execute());
    }
}
