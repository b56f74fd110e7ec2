//! Unified error handling for mirrorcat.
//!
//! Platform errors are the taxonomy the reconciliation core reacts to;
//! every chat-platform call is mapped into one of these variants so the
//! engine never has to inspect adapter-specific error types.

use std::time::Duration;
use thiserror::Error;

/// Errors from chat-platform operations (channel create/rename/delete,
/// authoritative reads).
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The bot lacks the required permission. Logged and abandoned;
    /// retried only by the next natural trigger.
    #[error("missing permissions")]
    Forbidden,

    /// The target no longer exists. Idempotent success for deletes,
    /// repair trigger for reads and edits.
    #[error("channel or guild not found")]
    NotFound,

    /// The platform asked us to back off. `retry_after` is the suggested
    /// wait when the platform supplied one.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The call did not complete within the bounded timeout.
    #[error("platform call timed out")]
    Timeout,

    /// Any other HTTP or gateway failure.
    #[error("platform error: {0}")]
    Http(String),
}

impl PlatformError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout => "timeout",
            Self::Http(_) => "http_error",
        }
    }
}
