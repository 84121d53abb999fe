//! Errors surfaced by the client API.

use std::time::Duration;

use hcp_core::{CodecError, CommandError};
use thiserror::Error;

/// Errors returned by [`crate::HcpClient`] and [`crate::HcpSession`].
///
/// Malformed inbound packets and sends on a closed connection are deliberately
/// absent: the engine drops the former and ignores the latter, and callers see
/// the eventual [`HcpError::Timeout`] instead.
#[derive(Debug, Error)]
pub enum HcpError {
    /// `start()`/`connect()` was called while a connection is already active.
    #[error("client already started")]
    AlreadyStarted,

    /// The command is missing its target or command name.  Nothing was sent.
    #[error(transparent)]
    InvalidCommand(#[from] CommandError),

    /// The request packet could not be encoded.  Nothing was sent.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No response with a matching `requestId` arrived in time.
    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout {
        request_id: String,
        timeout: Duration,
    },

    /// The connection closed before the response arrived.
    ///
    /// Only returned when `fail_pending_on_close` is enabled; otherwise the
    /// request waits out its timeout.
    #[error("connection closed while request {request_id} was pending")]
    ConnectionClosed { request_id: String },
}

impl HcpError {
    /// Returns `true` for [`HcpError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, HcpError::Timeout { .. })
    }
}
