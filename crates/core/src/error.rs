//! Error types for the price statistics core.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the price statistics core.
#[derive(Error, Debug)]
pub enum Error {
    /// Exact lookup missed under the raise-on-miss policy.
    #[error("Key not found: {key}")]
    NotFound {
        /// The searched key, rendered for display.
        key: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant violated; the current insert must be aborted.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A batch job was cancelled before it finished.
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    /// A background job failed to complete.
    #[error("Job error: {0}")]
    Job(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a not-found error for the given key.
    pub fn not_found(key: impl ToString) -> Self {
        Error::NotFound {
            key: key.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invariant violation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }

    /// Create a cancellation error.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Error::Cancelled(msg.into())
    }

    /// Create a job error.
    pub fn job(msg: impl Into<String>) -> Self {
        Error::Job(msg.into())
    }

    /// Whether this error came from a raise-on-miss lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
