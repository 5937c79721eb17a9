//! Error taxonomy for the synchronization layer.
//!
//! Every fallible operation returns [`SyncError`]. The retry engine uses
//! [`SyncError::is_transient`] as its default classification: network failures,
//! timeouts, 5xx statuses and a fixed set of transient message patterns are
//! retried; everything else is returned to the caller immediately.

use std::time::Duration;

/// Message fragments that mark an otherwise opaque error as transient.
/// Matched case-insensitively against the error message.
pub const TRANSIENT_ERROR_PATTERNS: &[&str] = &[
    "network request failed",
    "network error",
    "failed to fetch",
    "fetch failed",
    "load failed",
    "timeout",
    "timed out",
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
    "socket hang up",
    "connection reset",
    "connection refused",
    "service unavailable",
];

/// Errors surfaced by fetches, retries and transports.
///
/// `Clone` so a single outcome can be handed to several callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Request failed with status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Streaming channel error: {0}")]
    Streaming(String),
}

impl SyncError {
    /// Default retry classification.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) => true,
            SyncError::Status { code, message } => {
                *code >= 500 || matches_transient_pattern(message)
            }
            SyncError::Rejected(message) | SyncError::Streaming(message) => {
                matches_transient_pattern(message)
            }
            SyncError::Malformed(_) => false,
        }
    }

    /// HTTP-like status code, when the error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SyncError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Malformed(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Network(format!("timeout: {}", e))
        } else if let Some(status) = e.status() {
            SyncError::Status {
                code: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            SyncError::Malformed(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}

fn matches_transient_pattern(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_ERROR_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_and_timeout_are_transient() {
        assert!(SyncError::Network("unreachable".into()).is_transient());
        assert!(SyncError::Timeout(Duration::from_secs(30)).is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = SyncError::Status {
            code: 503,
            message: "Service Unavailable".into(),
        };
        assert!(err.is_transient());
        let err = SyncError::Status {
            code: 500,
            message: "boom".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_errors_are_fatal() {
        let err = SyncError::Status {
            code: 404,
            message: "channel not found".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn test_rejection_with_transient_message_is_transient() {
        assert!(SyncError::Rejected("ECONNRESET while reading".into()).is_transient());
        assert!(SyncError::Rejected("Network request failed".into()).is_transient());
        assert!(!SyncError::Rejected("permission denied".into()).is_transient());
    }

    #[test]
    fn test_malformed_is_never_transient() {
        assert!(!SyncError::Malformed("timeout field missing".into()).is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = SyncError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Request timed out after 1500ms");
    }

    #[test]
    fn test_json_error_maps_to_malformed() {
        let err: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, SyncError::Malformed(_)));
    }
}
