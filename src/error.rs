//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the board client.
//! It centralizes error management, providing a consistent way to handle and represent
//! the failures that can occur while loading the board mirror or executing a command:
//! network failures, partially failed reconciliations, rejected payloads, missing
//! capabilities and references to cards or columns that no longer exist.
//!
//! `AppError::user_message` produces the single human-readable line a command surfaces
//! to the caller. It also provides `From` trait implementations for common error types
//! like `serde_json::Error`, `validator::ValidationErrors`, `std::io::Error` and
//! `tokio::time::error::Elapsed`, allowing for easy conversion using the `?` operator.

use std::fmt;
use validator::ValidationErrors;

/// Represents all possible errors that can occur within the board client.
///
/// Each variant corresponds to a specific type of error, often carrying a message
/// detailing the issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// The session is not authenticated, so nothing can be loaded or written.
    Unauthorized(String),
    /// A single backend request failed (connection error, non-2xx, rejected write).
    NetworkFailure(String),
    /// A single backend request did not complete within the configured timeout.
    Timeout(String),
    /// One or more columns failed during card loading while others succeeded.
    PartialLoadFailure {
        /// Ids of the columns whose card fetch failed in that pass.
        failed_columns: Vec<String>,
    },
    /// A payload failed sanitation before send. The request is never transmitted.
    ValidationError(String),
    /// A command was attempted without the required capability.
    PermissionDenied(String),
    /// A referenced card or column is absent from the mirror or the backend.
    NotFound(String),
    /// The offline cache could not be read, written or purged.
    CacheError(String),
    /// An environment variable carried a value that could not be parsed.
    ConfigError(String),
    /// A payload or response could not be (de)serialized.
    SerializationError(String),
}

impl AppError {
    /// The message shown to the user when a command fails.
    ///
    /// Permission denials never reach the user, so they map to `None`.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AppError::PermissionDenied(_) => None,
            AppError::Unauthorized(_) => Some("Please sign in to continue.".to_string()),
            AppError::NetworkFailure(_) | AppError::Timeout(_) => {
                Some("Could not reach the server. Please try again.".to_string())
            }
            AppError::PartialLoadFailure { failed_columns } => Some(format!(
                "Some cards could not be loaded ({} column(s) failed).",
                failed_columns.len()
            )),
            AppError::ValidationError(msg) => Some(msg.clone()),
            AppError::NotFound(msg) => Some(msg.clone()),
            AppError::CacheError(_) | AppError::ConfigError(_) | AppError::SerializationError(_) => {
                Some("Something went wrong. Please try again.".to_string())
            }
        }
    }

    /// Whether the error came from the transport rather than from local checks.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::NetworkFailure(_) | AppError::Timeout(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NetworkFailure(msg) => write!(f, "Network Failure: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            AppError::PartialLoadFailure { failed_columns } => write!(
                f,
                "Partial Load Failure: columns [{}] failed",
                failed_columns.join(", ")
            ),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            AppError::PermissionDenied(msg) => write!(f, "Permission Denied: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::CacheError(msg) => write!(f, "Cache Error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Config Error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Converts `serde_json::Error` into `AppError::SerializationError`.
impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> AppError {
        AppError::SerializationError(error.to_string())
    }
}

/// Converts `std::io::Error` into `AppError::CacheError`.
///
/// The only filesystem access in the crate is the offline cache.
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> AppError {
        AppError::CacheError(error.to_string())
    }
}

/// Converts an elapsed request deadline into `AppError::Timeout`.
impl From<tokio::time::error::Elapsed> for AppError {
    fn from(error: tokio::time::error::Elapsed) -> AppError {
        AppError::Timeout(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        // Permission denials stay silent
        let error = AppError::PermissionDenied("viewer cannot create cards".into());
        assert!(error.user_message().is_none());

        // Validation messages are shown verbatim
        let error = AppError::ValidationError("No column to place the card in".into());
        assert_eq!(
            error.user_message().as_deref(),
            Some("No column to place the card in")
        );

        // Transport errors collapse to one retry message
        let network = AppError::NetworkFailure("connection reset".into());
        let timeout = AppError::Timeout("deadline has elapsed".into());
        assert_eq!(network.user_message(), timeout.user_message());
        assert!(network.is_transient());
        assert!(!AppError::NotFound("card".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let error = AppError::PartialLoadFailure {
            failed_columns: vec!["a".into(), "b".into()],
        };
        assert_eq!(error.to_string(), "Partial Load Failure: columns [a, b] failed");

        let error = AppError::NotFound("Card c-1 not found".into());
        assert_eq!(error.to_string(), "Not Found: Card c-1 not found");
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        match AppError::from(err) {
            AppError::SerializationError(msg) => assert!(!msg.is_empty()),
            other => panic!("Unexpected error: {:?}", other),
        }
    }
}
