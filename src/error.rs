//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout kvlookup.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ConnectionFailed`: Connect, authenticate or select handshake failed (fatal to a batch)
//! - `LookupFailed`: A single entity's GET failed at the transport level
//! - `PartialFailure`: Aggregate of per-entity failures within one batch
//! - `ProtocolError`: The store replied with something the client cannot interpret
//! - `InvalidInput`: Options that fail validation or malformed requests
//! - `ConfigError`: Profile file or profile registry errors
//!
//! A value that is not valid JSON is never an error: it becomes displayable
//! data (see [`crate::parse::ParsedValue::ParseError`]). A store miss is not
//! an error either, it is a result without data.

use thiserror::Error;

/// Main error type for kvlookup operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Store connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A single key lookup failed
    #[error("Lookup failed for key '{key}': {detail}")]
    LookupFailed { key: String, detail: String },

    /// Some entities of a batch failed while the others completed
    #[error("{failed} of {total} entity lookups failed")]
    PartialFailure { failed: usize, total: usize },

    /// Unexpected reply from the store
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LookupError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by hosts.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::LookupFailed { .. } => "LOOKUP_FAILED",
            Self::PartialFailure { .. } => "PARTIAL_FAILURE",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    ///
    /// Messages never contain the store password.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a per-key lookup error
    pub fn lookup_failed(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::LookupFailed { key: key.into(), detail: detail.into() }
    }

    /// Create an aggregate batch error
    #[must_use]
    pub const fn partial_failure(failed: usize, total: usize) -> Self {
        Self::PartialFailure { failed, total }
    }

    /// Create a protocol error
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for kvlookup operations
pub type Result<T> = std::result::Result<T, LookupError>;
