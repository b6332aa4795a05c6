//! Error taxonomy for the mail core
//!
//! Protocol failures are split into three classes because the sync and
//! action layers react differently to each: network errors are retried
//! with backoff, auth errors halt background sync until re-authentication,
//! and protocol errors are logged and treated as a failed operation.

use thiserror::Error;

/// Failure classes for remote server operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credential rejected or expired. Fatal to the session.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Transport-level failure. Transient; callers retry with backoff.
    #[error("network failure: {0}")]
    Network(String),

    /// Malformed or unexpected server response. Not retried automatically.
    #[error("malformed server response: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether a retry with backoff is worthwhile
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Whether this failure invalidates the session
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }
}

/// Cache-level failures
///
/// `InvariantViolation` is a programming error, not a runtime condition to
/// recover from: a folder index referencing a message that is absent from
/// storage means a mutation path skipped the store's single write lock.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("folder {folder} index references missing message {message}")]
    InvariantViolation { folder: String, message: String },

    #[error("unknown message: {0}")]
    UnknownMessage(String),

    #[error("unknown mailbox: {0}")]
    UnknownMailbox(String),
}

/// Extract the client error class from an `anyhow` chain, if any
pub fn client_error(err: &anyhow::Error) -> Option<&ClientError> {
    err.downcast_ref::<ClientError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Network("timed out".into()).is_transient());
        assert!(!ClientError::Auth("401".into()).is_transient());
        assert!(!ClientError::Protocol("bad json".into()).is_transient());
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err = anyhow::Error::from(ClientError::Auth("expired token".into()));
        let class = client_error(&err).unwrap();
        assert!(class.is_auth());
    }

    #[test]
    fn test_downcast_with_context() {
        use anyhow::Context;
        let result: anyhow::Result<()> =
            Err(ClientError::Network("connection reset".into())).context("syncing inbox");
        let err = result.unwrap_err();
        assert!(client_error(&err).unwrap().is_transient());
    }
}
