//! Error types for the zonesync engine
//!
//! This module defines all error types used throughout the crate. The variants
//! follow the failure taxonomy of a reconciliation run:
//!
//! - per-record: [`MalformedRecordError`] (skip + warn, run continues)
//! - per-run: [`Error::Fetch`] (run aborts before any destination mutation)
//! - per-action: [`Error::Apply`] (recorded against the action, run continues)
//! - per-trigger: [`Error::LockContention`] (trigger dropped, informational)
//! - load-time: [`Error::PolicyMisconfiguration`] (fails fast, never mid-run)

use crate::record::RawRecord;
use thiserror::Error;

/// Result type alias for zonesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// A provider payload that could not be normalized.
///
/// Carries the offending raw record so the caller can surface it as a
/// skipped-record warning instead of aborting the run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed {} record '{}': {reason}", .raw.record_type, .raw.name)]
pub struct MalformedRecordError {
    /// The raw record as the provider returned it
    pub raw: RawRecord,
    /// Why normalization rejected it
    pub reason: String,
}

impl MalformedRecordError {
    pub fn new(raw: &RawRecord, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.clone(),
            reason: reason.into(),
        }
    }
}

/// Core error type for zonesync
#[derive(Error, Debug)]
pub enum Error {
    /// Fetching records from a provider failed (network, auth, missing zone)
    #[error("Fetch failed ({provider}): {message}")]
    Fetch {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// A single create/update/delete call against the destination failed
    #[error("Apply failed ({provider}): {message}")]
    Apply {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// A provider record could not be normalized
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecordError),

    /// Global policy is inconsistent; raised at load time only
    #[error("Policy misconfiguration: {0}")]
    PolicyMisconfiguration(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run is already in flight for the domain
    #[error("Sync already in progress for {0}")]
    LockContention(String),

    /// The worker queue has no room for another run
    #[error("Sync queue is full, trigger for {0} dropped")]
    QueueFull(String),

    /// The domain is not present in the configuration store
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// A provider call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// History store errors
    #[error("History store error: {0}")]
    HistoryStore(String),

    /// Record or zone not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an apply error
    pub fn apply(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a policy misconfiguration error
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyMisconfiguration(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a history store error
    pub fn history_store(msg: impl Into<String>) -> Self {
        Self::HistoryStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this error only signals that a trigger was dropped because the
    /// domain is busy. Callers log it at info level rather than as a failure.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::LockContention(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
