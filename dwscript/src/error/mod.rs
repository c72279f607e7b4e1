//! Error types for hosts embedding the evaluator

use crate::ast::Position;
use crate::interp::RuntimeError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The program file is not a valid serialized syntax tree
    #[error("invalid program: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Evaluation error surfaced as a diagnostic
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A script exception nobody handled
    #[error("Exception {class}: {message}")]
    Uncaught {
        class: String,
        message: String,
        position: Option<Position>,
    },
}

impl Error {
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Runtime(e) => e.position,
            Error::Uncaught { position, .. } => *position,
            Error::Io(_) | Error::Json(_) | Error::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncaught_display() {
        let err = Error::Uncaught {
            class: "EAssertionFailed".to_string(),
            message: "Assertion failed".to_string(),
            position: Some(Position::new(2, 3)),
        };
        assert_eq!(err.to_string(), "Exception EAssertionFailed: Assertion failed");
        assert_eq!(err.position(), Some(Position::new(2, 3)));
    }

    #[test]
    fn test_runtime_error_is_transparent() {
        let err: Error = RuntimeError::division_by_zero().into();
        assert_eq!(err.to_string(), "Runtime error: division by zero");
    }
}
