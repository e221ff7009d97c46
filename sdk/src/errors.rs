//! Error types and handling
//!
//! This module provides the error types shared by the Vigil engine and its
//! tool surface. All errors implement the `VigilErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages are built from scrubbed transport output, so they never
//! carry credentials, bearer tokens or basic-auth headers.

use thiserror::Error;

/// Trait for Vigil error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait VigilErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain secrets
    /// or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried on a later call. Non-recoverable
    /// errors require a configuration change or a restart.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration, credentials
/// - **Database**: SQLite operation failures
/// - **Registry**: Unknown sources and malformed source parameters
/// - **Tools**: Unknown tools and failed tool calls
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, VigilErrorExt};
///
/// let error = EngineError::UnknownSource("get_wazuh_everything".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let transient = EngineError::Network("connection reset".to_string());
/// assert!(transient.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Registry errors
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Duplicate source: {0}")]
    DuplicateSource(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VigilErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingCredential(_) => {
                "Set the Wazuh credentials in the environment or the system keychain"
            }

            // Database errors
            Self::Database(_) => "Cache database unavailable. Check the data directory",

            // Registry errors
            Self::UnknownSource(_) => "The requested data source is not registered",
            Self::DuplicateSource(_) => "Each data source may only be registered once",
            Self::InvalidParameter { .. } => "Check the parameter values for this source",

            // Tool errors
            Self::ToolNotFound(_) => "The requested tool is not available",
            Self::ToolError(_) => "Tool operation failed",

            // Keyring errors
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            // Network errors
            Self::Network(_) => "Network operation failed. Check your connection",

            Self::Serialization(_) => "Result could not be encoded",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::MissingCredential(_)
            | Self::UnknownSource(_)
            | Self::DuplicateSource(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_are_fatal() {
        assert!(!EngineError::UnknownSource("x".into()).is_recoverable());
        assert!(!EngineError::DuplicateSource("x".into()).is_recoverable());
        assert!(!EngineError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_runtime_errors_are_recoverable() {
        assert!(EngineError::Network("reset".into()).is_recoverable());
        assert!(EngineError::Database("locked".into()).is_recoverable());
        assert!(EngineError::InvalidParameter {
            name: "limit".into(),
            reason: "not a number".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_invalid_parameter_message() {
        let err = EngineError::InvalidParameter {
            name: "agent_id".into(),
            reason: "must not be empty".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'agent_id': must not be empty"
        );
        assert_eq!(err.user_hint(), "Check the parameter values for this source");
    }
}
