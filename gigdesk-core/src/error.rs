//! Error types for the marketplace core
//!
//! One taxonomy covers every operation; the HTTP layer maps each variant to
//! a status code (400/401/403/404/409/500) without inspecting messages.

use thiserror::Error;

/// Main error type for marketplace operations
#[derive(Error, Debug)]
pub enum MarketError {
    /// Missing or malformed input fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or unknown credential
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid identity, insufficient role or ownership
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state transition (already completed, already resolved)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store read/write failures
    #[error("Storage error: {0}")]
    Storage(String),
}

impl MarketError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an unauthenticated error
    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self {
        Self::Unauthenticated(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<std::io::Error> for MarketError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
