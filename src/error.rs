//! Error types for remanga-farmer
//!
//! The error taxonomy mirrors the propagation policy of the farming loop:
//! only [`Error::Config`], [`Error::InvalidToken`] and
//! [`Error::InvalidCredentials`] may terminate an account's task. Everything
//! else is absorbed inside the request executor's retry loop or degrades to
//! "skip this unit of work, retry next cycle".

use thiserror::Error;

/// Result type alias for remanga-farmer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for remanga-farmer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    ///
    /// Raised before any network call is attempted, e.g. when an account line
    /// carries neither a username/password pair nor a token.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g. "credentials")
        key: Option<String>,
    },

    /// The login endpoint rejected the supplied token (HTTP 401)
    ///
    /// Fatal for the account's session; the retry loop bails immediately
    /// rather than burning its attempt budget on a credential that can never
    /// succeed.
    #[error("wrong auth credentials on token: {token}")]
    InvalidToken {
        /// The token the server rejected
        token: String,
    },

    /// The login endpoint rejected the username/token pair (HTTP 400)
    #[error("wrong auth credentials on user: {username:?} | token: {token:?}")]
    InvalidCredentials {
        /// Username submitted with the login request, if any
        username: Option<String>,
        /// Token submitted with the login request, if any
        token: Option<String>,
    },

    /// Network error from the underlying HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (cache file reads/writes, account list)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response that had to carry a JSON body came back malformed
    ///
    /// Treated by callers the same way as an exhausted retry budget: skip the
    /// unit of work and let the next cycle retry it.
    #[error("unexpected response shape from {endpoint}: {message}")]
    UnexpectedResponse {
        /// Endpoint that produced the malformed body
        endpoint: String,
        /// What was missing or malformed
        message: String,
    },
}

impl Error {
    /// Returns true if this error must terminate the owning account's task
    ///
    /// Per the propagation policy, only configuration and auth failures are
    /// fatal; every other failure is retried or skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::InvalidToken { .. } | Error::InvalidCredentials { .. }
        )
    }
}
