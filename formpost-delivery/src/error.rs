//! Typed error handling for delivery attempts.
//!
//! A [`TransportError`] never escapes a flush: it is recorded against the
//! message in the spool and reported in the
//! [`FlushReport`](crate::FlushReport).

use std::time::Duration;

use thiserror::Error;

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The relay could not be reached, or the connection broke mid-session.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The relay answered, but refused the message.
    #[error("Rejected by relay: {0}")]
    Rejected(String),

    /// The send did not complete within the configured send timeout.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    /// The message could not be turned into something sendable (bad
    /// address, unreadable attachment, ...).
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl TransportError {
    /// `true` if retrying the same message later could succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::Timeout(_))
    }
}
