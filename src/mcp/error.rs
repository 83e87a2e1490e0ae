//! Error types for the WebSocket session layer.
//!
//! The session layer surfaces mechanical failures (connect, timeout,
//! transport loss, send) as typed errors. Protocol-level JSON-RPC `error`
//! members are not represented here; the discovery driver inspects those on
//! correlated frames itself.

use std::time::Duration;

use thiserror::Error;

/// Errors from establishing a WebSocket session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The target address or a header could not be turned into a handshake
    /// request.
    #[error("invalid connection request for {address}: {reason}")]
    InvalidRequest {
        /// The address that was rejected.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The peer did not complete the handshake within the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The peer was unreachable or rejected the WebSocket handshake.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
}

/// Terminal transport failure, latched once per session.
///
/// Cloneable so a single cause can be handed to every current and future
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// I/O or protocol failure on the live connection.
    #[error("websocket transport error: {0}")]
    Io(String),

    /// The connection is closed, either by the peer or locally.
    #[error("websocket closed{}", closed_suffix(.reason))]
    Closed {
        /// Close reason, when one was supplied.
        reason: Option<String>,
    },
}

fn closed_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl TransportError {
    pub(crate) fn closed_locally() -> Self {
        TransportError::Closed {
            reason: Some("closed by client".to_string()),
        }
    }
}

/// Errors from a correlated `listen` call.
#[derive(Debug, Error)]
pub enum ListenError {
    /// The shared session budget ran out before the predicate matched.
    #[error("timed out waiting for a correlated frame")]
    Timeout,

    /// The session failed; the latched cause is attached.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from sending on the session.
#[derive(Debug, Error)]
pub enum SendError {
    /// The session is closed or already latched; nothing was written.
    #[error("send on closed session: {0}")]
    Closed(TransportError),

    /// The write itself failed.
    #[error("websocket send failed: {0}")]
    Io(String),

    /// The payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
