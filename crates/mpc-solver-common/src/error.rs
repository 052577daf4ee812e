//! Error types and exit codes for solver communication.

use thiserror::Error;

/// Exit codes for solver subprocess communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success (check the status in the solution for optimality)
    Success = 0,
    /// Invalid input (malformed JSON, missing fields)
    InvalidInput = 1,
    /// Solver error (license, numerical issues, unsupported constraint)
    SolverError = 2,
    /// Timeout
    Timeout = 3,
    /// Segfault (SIGSEGV) - native crash
    Segfault = 139,
}

impl ExitCode {
    /// Convert from a raw process exit code.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ExitCode::Success,
            1 => ExitCode::InvalidInput,
            3 => ExitCode::Timeout,
            139 => ExitCode::Segfault,
            _ => ExitCode::SolverError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Errors that can occur while talking to a solver backend.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Unknown backend name or path.
    #[error("unknown solver backend: {0}")]
    UnknownBackend(String),

    /// The solver binary could not be located.
    #[error("solver binary not found: {0}")]
    NotFound(String),

    /// Solver process failed to start.
    #[error("failed to start solver process: {0}")]
    ProcessStart(#[source] std::io::Error),

    /// Solver process crashed or returned an error exit code.
    #[error("solver process failed with exit code {exit_code:?}: {message}")]
    ProcessFailed { exit_code: ExitCode, message: String },

    /// Timeout while waiting for the solver.
    #[error("solver timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Protocol violation (empty reply, version mismatch, etc.)
    #[error("solver protocol error: {0}")]
    Protocol(String),

    /// The solver rejected a constraint kind or option it does not support.
    #[error("unsupported by solver {solver}: {what}")]
    Unsupported { solver: String, what: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping() {
        assert_eq!(ExitCode::from_raw(0), ExitCode::Success);
        assert_eq!(ExitCode::from_raw(1), ExitCode::InvalidInput);
        assert_eq!(ExitCode::from_raw(3), ExitCode::Timeout);
        assert_eq!(ExitCode::from_raw(139), ExitCode::Segfault);
        // Unknown codes are treated as solver errors.
        assert_eq!(ExitCode::from_raw(42), ExitCode::SolverError);
        assert!(ExitCode::from_raw(0).is_success());
        assert!(!ExitCode::from_raw(2).is_success());
    }
}
