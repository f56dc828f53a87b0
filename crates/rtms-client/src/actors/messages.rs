//! Actor mailbox messages and observable channel states.

use crate::errors::RtmsError;
use crate::session::Session;

use super::registry::{ManagedSession, RegistryHandle};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Which of a session's two channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Signaling,
    Media,
}

impl ChannelRole {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Signaling => "signaling",
            ChannelRole::Media => "media",
        }
    }
}

/// Signaling channel lifecycle.
///
/// A failed dial leaves the channel in `Connecting`; a rejected handshake
/// leaves it in `HandshakeSent`. Neither is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Connecting,
    HandshakeSent,
    Established,
    Closed,
}

impl SignalingState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalingState::Connecting => "connecting",
            SignalingState::HandshakeSent => "handshake_sent",
            SignalingState::Established => "established",
            SignalingState::Closed => "closed",
        }
    }
}

/// Media channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Connecting,
    HandshakeSent,
    Established,
    /// Start-streaming was issued on the signaling channel.
    Streaming,
    Closed,
}

impl MediaState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaState::Connecting => "connecting",
            MediaState::HandshakeSent => "handshake_sent",
            MediaState::Established => "established",
            MediaState::Streaming => "streaming",
            MediaState::Closed => "closed",
        }
    }
}

/// Messages to the signaling channel.
#[derive(Debug)]
pub enum SignalingMessage {
    /// Write msg_type 7 for `stream_id`. Replies once the frame is written.
    StartStreaming {
        stream_id: String,
        respond_to: oneshot::Sender<Result<(), RtmsError>>,
    },
}

/// Messages to the session registry.
pub enum RegistryMessage {
    /// Register a session and spawn its signaling channel. Replies with the
    /// session it displaced, if any.
    StartSession {
        session: Session,
        registry: RegistryHandle,
        respond_to: oneshot::Sender<Option<ManagedSession>>,
    },

    /// Sent by a signaling channel after a successful handshake.
    ConnectMedia {
        meeting_id: String,
        signaling_channel_id: Uuid,
        media_url: String,
        registry: RegistryHandle,
    },

    /// Sent by a channel task as it exits.
    ChannelClosed {
        meeting_id: String,
        channel_id: Uuid,
        role: ChannelRole,
    },

    /// Detach a session. The caller closes it.
    RemoveSession {
        meeting_id: String,
        respond_to: oneshot::Sender<Option<ManagedSession>>,
    },

    /// Detach every session (shutdown).
    Drain {
        respond_to: oneshot::Sender<Vec<ManagedSession>>,
    },

    GetSession {
        meeting_id: String,
        respond_to: oneshot::Sender<Option<SessionInfo>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
}

/// Point-in-time view of one registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub meeting_id: String,
    pub stream_id: String,
    /// `None` once the signaling channel has exited.
    pub signaling: Option<SignalingState>,
    /// `None` until media is dialed, and again after it exits.
    pub media: Option<MediaState>,
}

/// Registry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub session_count: usize,
}
