//! Driver errors and exit statuses
//!
//! Every component returns a tagged result; the orchestrator catches at
//! the component boundary and maps the status straight onto the process
//! exit code.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    BackendError,
    InvalidArgs,
    Inconclusive,
    ParsingError,
    Failed,
    Timeout,
    NotFound,
    Killed,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::BackendError => 1,
            ExitStatus::InvalidArgs => 2,
            ExitStatus::Inconclusive => 5,
            ExitStatus::ParsingError => 6,
            ExitStatus::Failed => 10,
            ExitStatus::Timeout => 124,
            ExitStatus::NotFound => 127,
            ExitStatus::Killed => 130,
        }
    }

    /// User-facing one-liner printed at the end of a run.
    pub fn message(&self, simulate: bool) -> String {
        let task = if simulate { "Simulation" } else { "Verification" };
        match self {
            ExitStatus::Success => {
                if simulate {
                    "Done.".to_string()
                } else {
                    "Verification successful.".to_string()
                }
            }
            ExitStatus::BackendError => "Backend failed.".to_string(),
            ExitStatus::InvalidArgs => "Invalid arguments.".to_string(),
            ExitStatus::Inconclusive => "Verification inconclusive.".to_string(),
            ExitStatus::ParsingError => "Could not parse input file.".to_string(),
            ExitStatus::Failed => format!("{} failed.", task),
            ExitStatus::Timeout => format!("{} stopped (timeout).", task),
            ExitStatus::NotFound => "Backend executable not found.".to_string(),
            ExitStatus::Killed => format!("\n{} stopped (interrupt).", task),
        }
    }
}

/// A tagged driver error: the status decides the exit code, the message
/// is logged at the boundary.
#[derive(Debug, Clone)]
pub struct DriverError {
    pub status: ExitStatus,
    pub message: String,
}

impl DriverError {
    pub fn new(status: ExitStatus, message: impl Into<String>) -> Self {
        DriverError {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        DriverError::new(ExitStatus::InvalidArgs, message)
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        DriverError::new(ExitStatus::ParsingError, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        DriverError::new(ExitStatus::BackendError, message)
    }

    /// The SMT model could not be obtained even after retracting every
    /// soft constraint.
    pub fn concretization_failed() -> Self {
        DriverError::backend("Could not find a valid concretization.")
    }

    /// Success used as control flow (e.g. nothing to verify).
    pub fn done(message: impl Into<String>) -> Self {
        DriverError::new(ExitStatus::Success, message)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DriverError {}

pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_match_contract() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::BackendError.code(), 1);
        assert_eq!(ExitStatus::InvalidArgs.code(), 2);
        assert_eq!(ExitStatus::ParsingError.code(), 6);
        assert_eq!(ExitStatus::Failed.code(), 10);
        assert_eq!(ExitStatus::Timeout.code(), 124);
        assert_eq!(ExitStatus::Killed.code(), 130);
    }

    #[test]
    fn test_messages_depend_on_mode() {
        assert_eq!(ExitStatus::Success.message(true), "Done.");
        assert_eq!(
            ExitStatus::Failed.message(false),
            "Verification failed."
        );
        assert_eq!(ExitStatus::Failed.message(true), "Simulation failed.");
    }
}
