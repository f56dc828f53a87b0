//! RTMS client error types.
//!
//! None of these errors is retried inside the client. A failed session start
//! stays failed until the next `meeting.rtms_started` event.

use crate::protocol::ProtocolError;
use thiserror::Error;

/// RTMS client error type.
#[derive(Debug, Error)]
pub enum RtmsError {
    /// Dialing the relay failed (signaling or media).
    #[error("Connection error: {0}")]
    Connection(String),

    /// An inbound message failed decoding or schema validation.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Read or write failure on an open socket.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An outbound message could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// No session is registered for the meeting.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The controller is shutting down and accepts no new sessions.
    #[error("Shutting down")]
    ShuttingDown,

    /// Actor mailbox or reply channel failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RtmsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RtmsError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RtmsError {
    fn from(err: serde_json::Error) -> Self {
        RtmsError::Encode(err.to_string())
    }
}
