//! Remote channel error types.
//!
//! Transient failures (`Transport`, `Timeout`, `Status`) end the current session and
//! schedule a reconnect. A `Timeout` before the session is established is just an
//! empty poll. `Protocol` means the endpoint is not a compatible controller;
//! it is returned to the caller and stops the receive loop.

use warden_core::error::{RemoteChannelError, WardenError};

/// Remote channel domain error
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded the transport timeout
    #[error("request timed out")]
    Timeout,

    /// Unexpected HTTP status
    #[error("unexpected http status {0}")]
    Status(u16),

    /// Response body is not a valid channel message
    #[error("incompatible endpoint: {0}")]
    Protocol(String),

    /// Emit attempted without an established session
    #[error("not connected")]
    NotConnected,
}

impl RemoteError {
    /// Whether the error ends the session but allows a reconnect.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Protocol(_))
    }
}

impl From<RemoteError> for WardenError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Protocol(reason) => {
                WardenError::Remote(RemoteChannelError::Protocol(reason))
            }
            other => WardenError::Remote(RemoteChannelError::Transport(other.to_string())),
        }
    }
}
