//! Error types for rotate-files.

use thiserror::Error;

/// Result type alias using rotate-files' Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rotate-files.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid rotation scheme: {0}")]
    InvalidScheme(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Failed to list artifacts: {0}")]
    ProviderList(String),

    #[error("Failed to delete {identifier}: {message}")]
    ProviderDelete { identifier: String, message: String },

    #[error("{failed} of {attempted} deletions failed")]
    PartialDeletion { failed: usize, attempted: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid scheme error.
    pub fn invalid_scheme(msg: impl Into<String>) -> Self {
        Self::InvalidScheme(msg.into())
    }

    /// Create an invalid location error.
    pub fn invalid_location(msg: impl Into<String>) -> Self {
        Self::InvalidLocation(msg.into())
    }

    /// Create a listing error.
    pub fn provider_list(msg: impl Into<String>) -> Self {
        Self::ProviderList(msg.into())
    }

    /// Create a per-record deletion error.
    pub fn provider_delete(identifier: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ProviderDelete {
            identifier: identifier.into(),
            message: msg.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
