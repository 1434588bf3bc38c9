//! Credential error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while acquiring, renewing or validating tokens.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Network error talking to the auth endpoints.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-auth HTTP failure (5xx, 404, 429, ...).
    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The server rejected the credentials (HTTP 401).
    #[error("Authentication rejected: {message}")]
    AuthRejected { message: String },

    /// The server rejected the request content (HTTP 400).
    #[error("Authentication request rejected: {message}")]
    ValidationRejected { message: String },

    /// The issued token does not line up with the local clock.
    #[error("Local clock invalid: token time {adjusted} is too far from local time {now}")]
    ClockSkew {
        adjusted: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Player or server context is not ready yet.
    #[error("Identity unavailable")]
    IdentityUnavailable,

    /// No cached token for the current identity.
    #[error("No token present")]
    NoTokenPresent,

    /// The token could not be parsed.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The server configuration lacks a required credential.
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Persisting to the server configuration store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error (bad URL, HTTP client setup).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CredentialError {
    /// Check if this error is transient and may be retried by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::UnexpectedStatus { .. })
    }

    /// Check if this error is fatal for the current session.
    ///
    /// Fatal errors have already purged the cache entry and notified the user.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthRejected { .. } | Self::ValidationRejected { .. } | Self::ClockSkew { .. }
        )
    }

    /// Check if this error forces the transport to disconnect.
    #[inline]
    pub fn requires_disconnect(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}
