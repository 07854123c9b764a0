//! Error types for the push stack.

use std::time::Duration;

use thiserror::Error;

/// Transport-level failures. All of them are recoverable by reconnecting.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be turned into a connect request.
    #[error("invalid endpoint '{url}': {reason}")]
    InvalidUrl {
        /// Offending endpoint.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The socket could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The socket open did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// A frame could not be sent.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading from an open socket failed.
    #[error("socket error: {0}")]
    Socket(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Terminal failure of a push session, carried by its fatal signal.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("push session gave up after {attempts} reconnect attempts: {reason}")]
pub struct SessionFailure {
    /// Reconnect attempts made before giving up.
    pub attempts: u32,
    /// Reason of the last failure.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TransportError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "connect timed out after 10s");

        let failure = SessionFailure {
            attempts: 5,
            reason: "no connection ack within 6s".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "push session gave up after 5 reconnect attempts: no connection ack within 6s"
        );
    }
}
