//! Unified error types for the MPC toolkit
//!
//! This module provides a common error type [`MpcError`] that can represent
//! errors from any part of the system. Domain-specific error types can be
//! converted to `MpcError` for uniform handling at API boundaries (the CLI
//! in particular).

use thiserror::Error;

/// Unified error type for all toolkit operations.
#[derive(Error, Debug)]
pub enum MpcError {
    /// I/O errors (file access, subprocess spawning, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Scenario validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/transcription errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using MpcError.
pub type MpcResult<T> = Result<T, MpcError>;

impl From<anyhow::Error> for MpcError {
    fn from(err: anyhow::Error) -> Self {
        MpcError::Other(err.to_string())
    }
}

impl From<String> for MpcError {
    fn from(s: String) -> Self {
        MpcError::Other(s)
    }
}

impl From<&str> for MpcError {
    fn from(s: &str) -> Self {
        MpcError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for MpcError {
    fn from(err: serde_json::Error) -> Self {
        MpcError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MpcError::Validation("horizon must be at least 1".into());
        assert!(err.to_string().contains("Validation error"));
        assert!(err.to_string().contains("horizon"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MpcError = io_err.into();
        assert!(matches!(err, MpcError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> MpcResult<()> {
            Err(MpcError::Validation("test".into()))
        }

        fn outer() -> MpcResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
