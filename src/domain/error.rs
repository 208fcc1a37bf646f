//! Error taxonomy for the monitoring engine
//!
//! Per-zone errors (`FetchError`, `PersistenceError`, `NotificationError`) are
//! contained by the component that sees them. Only `EngineError` escapes the
//! scheduler loop.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Timeout or 5xx
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Explicit rate-limit signal from the API
    #[error("rate limited ({available} tokens available, reset in {reset_after:?})")]
    RateLimited { available: u32, reset_after: Duration },

    /// Zone not found or request rejected
    #[error("permanent fetch failure: {0}")]
    Permanent(String),

    /// Connect failure (refused, DNS, TLS handshake)
    #[error("status api unreachable: {0}")]
    Unreachable(String),
}

impl FetchError {
    /// Worth one more attempt after the retry backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Unreachable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transient(_) => "transient",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Permanent(_) => "permanent",
            FetchError::Unreachable(_) => "unreachable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("persistence io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("{channel} request failed: {reason}")]
    Request { channel: &'static str, reason: String },

    #[error("{channel} rejected the message: {reason}")]
    Rejected { channel: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Every fetch failed to connect, sweep after sweep
    #[error("status api unreachable for {sweeps} consecutive sweeps ({failed} zones in the last): {last_error}")]
    ApiUnreachable { sweeps: u32, failed: usize, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_and_unreachable_are_retryable() {
        assert!(FetchError::Transient("timeout".into()).is_retryable());
        assert!(FetchError::Unreachable("refused".into()).is_retryable());
        assert!(!FetchError::Permanent("not found".into()).is_retryable());
        assert!(!FetchError::RateLimited { available: 0, reset_after: Duration::from_secs(60) }
            .is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = NotificationError::Rejected { channel: "pushover", reason: "bad token".into() };
        assert_eq!(err.to_string(), "pushover rejected the message: bad token");
    }
}
