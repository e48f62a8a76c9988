//! Error types for the sync engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by durable key-value storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error for {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode record '{0}': {1}")]
    Encode(String, #[source] serde_json::Error),

    #[error("Failed to decode record '{0}': {1}")]
    Decode(String, #[source] serde_json::Error),
}

/// Errors from a single pull or push against the stats endpoints.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("No auth token available")]
    Unauthenticated,
}

impl TransportError {
    /// Returns true if the request may succeed when sent again unchanged.
    ///
    /// Only client errors (4xx) answered by the server are final. A missing
    /// token never reached the server and is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => !(400..500).contains(status),
            TransportError::Timeout | TransportError::Connection(_) => true,
            TransportError::Decode(_) | TransportError::Unauthenticated => true,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            TransportError::Connection(e.to_string())
        }
    }
}

/// Top-level error for engine construction and the realtime channel.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Engine must be created inside a tokio runtime")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_final() {
        for status in [400, 401, 404, 409, 422, 499] {
            let err = TransportError::Status {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{} should not retry", status);
        }
    }

    #[test]
    fn test_server_and_network_errors_retry() {
        for status in [500, 502, 503, 504] {
            let err = TransportError::Status {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{} should retry", status);
        }
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Connection("reset".into()).is_retryable());
    }

    #[test]
    fn test_missing_token_is_not_final() {
        assert!(TransportError::Unauthenticated.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Status {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(err.to_string(), "Server returned status 503: busy");
        assert_eq!(
            SyncError::NoRuntime.to_string(),
            "Engine must be created inside a tokio runtime"
        );
    }
}
