//! `SignalingChannel` - control-plane connection of one session.
//!
//! Each `SignalingChannel`:
//! - Dials the relay's signaling URL and sends the signed handshake (msg 1)
//! - On a successful ack (msg 2), subscribes to events if configured and asks
//!   the registry to open the media channel on the advertised URL
//! - Answers every keepalive request (msg 12) in-channel
//! - Writes start-streaming (msg 7) when the media channel asks for it
//!
//! # Lifecycle
//!
//! `Connecting -> HandshakeSent -> Established -> Closed`. The task ends on
//! socket close, read or write failure, or cancellation of the session
//! token. It never reconnects. On exit it reports to the registry.

use crate::errors::RtmsError;
use crate::observability::metrics;
use crate::protocol::{
    self, codes, EventSubscriptionRequest, InboundMessage, KeepAliveResponse,
    SignalingHandshakeRequest, StartStreamingRequest,
};
use crate::session::{ClientContext, Session};
use crate::transport::{self, RelaySocket};

use super::media::StartStreamingRequester;
use super::messages::{ChannelRole, SignalingMessage, SignalingState};
use super::registry::RegistryHandle;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the signaling mailbox.
const SIGNALING_CHANNEL_BUFFER: usize = 16;

/// Upper bound (exclusive) of the handshake correlation sequence.
const SEQUENCE_RANGE: u32 = 1_000_000_000;

const ROLE: ChannelRole = ChannelRole::Signaling;

/// Handle to a `SignalingChannel`.
#[derive(Clone, Debug)]
pub struct SignalingChannelHandle {
    sender: mpsc::Sender<SignalingMessage>,
    cancel_token: CancellationToken,
    channel_id: Uuid,
    state: watch::Receiver<SignalingState>,
}

impl SignalingChannelHandle {
    #[must_use]
    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    /// Current channel state.
    #[must_use]
    pub fn state(&self) -> SignalingState {
        *self.state.borrow()
    }

    /// Wait until the channel reaches `target`.
    ///
    /// Fails if the channel task exits first without ever publishing it.
    pub async fn wait_for_state(&self, target: SignalingState) -> Result<(), RtmsError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| {
                RtmsError::Internal(format!(
                    "signaling channel exited before reaching {}",
                    target.as_str()
                ))
            })
    }

    /// Send start-streaming for `stream_id` on this channel.
    ///
    /// Resolves once the frame has been written to the socket.
    pub async fn start_streaming(&self, stream_id: String) -> Result<(), RtmsError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SignalingMessage::StartStreaming {
                stream_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RtmsError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the channel task. The socket is closed on the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[async_trait]
impl StartStreamingRequester for SignalingChannelHandle {
    async fn request_start_streaming(&self, stream_id: &str) -> Result<(), RtmsError> {
        self.start_streaming(stream_id.to_string()).await
    }
}

/// The `SignalingChannel` implementation.
pub struct SignalingChannel {
    channel_id: Uuid,
    session: Session,
    context: Arc<ClientContext>,
    registry: RegistryHandle,
    receiver: mpsc::Receiver<SignalingMessage>,
    /// Child of the session token.
    cancel_token: CancellationToken,
    state: watch::Sender<SignalingState>,
}

impl SignalingChannel {
    /// Spawn the channel task. Dialing happens inside the task.
    pub fn spawn(
        session: Session,
        context: Arc<ClientContext>,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> (SignalingChannelHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SIGNALING_CHANNEL_BUFFER);
        let (state, state_rx) = watch::channel(SignalingState::Connecting);
        let channel_id = Uuid::new_v4();

        let channel = Self {
            channel_id,
            session,
            context,
            registry,
            receiver,
            cancel_token: cancel_token.clone(),
            state,
        };

        let task_handle = tokio::spawn(channel.run());

        let handle = SignalingChannelHandle {
            sender,
            cancel_token,
            channel_id,
            state: state_rx,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "rtms.channel.signaling",
        fields(
            meeting_id = %self.session.meeting_id,
            channel_id = %self.channel_id
        )
    )]
    async fn run(mut self) {
        debug!(
            target: "rtms.channel.signaling",
            meeting_id = %self.session.meeting_id,
            url = %self.session.server_url,
            "SignalingChannel started"
        );

        if let Some(mut socket) = self.open().await {
            self.read_loop(&mut socket).await;
            self.set_state(SignalingState::Closed);
            transport::close(socket).await;
            metrics::record_channel_closed(ROLE.as_str());
        }

        if let Err(e) = self
            .registry
            .channel_closed(self.session.meeting_id.clone(), self.channel_id, ROLE)
            .await
        {
            debug!(
                target: "rtms.channel.signaling",
                meeting_id = %self.session.meeting_id,
                error = %e,
                "Registry gone, closure not reported"
            );
        }

        info!(
            target: "rtms.channel.signaling",
            meeting_id = %self.session.meeting_id,
            final_state = self.state.borrow().as_str(),
            "SignalingChannel stopped"
        );
    }

    /// Dial and send the handshake.
    ///
    /// Returns `None` if the dial failed (state stays `Connecting`), the
    /// handshake write failed (state becomes `Closed`), or the session was
    /// stopped meanwhile.
    async fn open(&mut self) -> Option<RelaySocket> {
        let connected = tokio::select! {
            () = self.cancel_token.cancelled() => return None,
            result = transport::connect(&self.session.server_url) => result,
        };

        let mut socket = match connected {
            Ok(socket) => socket,
            Err(e) => {
                error!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    error = %e,
                    "Signaling connect failed, abandoning session start"
                );
                metrics::record_connect_failure(ROLE.as_str());
                return None;
            }
        };

        let sequence = rand::thread_rng().gen_range(0..SEQUENCE_RANGE);
        let request = SignalingHandshakeRequest::new(
            self.session.meeting_id.clone(),
            self.session.stream_id.clone(),
            sequence,
            self.context
                .credentials
                .sign(&self.session.meeting_id, &self.session.stream_id),
        );

        if let Err(e) = transport::send_json(&mut socket, &request).await {
            warn!(
                target: "rtms.channel.signaling",
                meeting_id = %self.session.meeting_id,
                error = %e,
                "Failed to send signaling handshake"
            );
            self.set_state(SignalingState::Closed);
            transport::close(socket).await;
            metrics::record_channel_closed(ROLE.as_str());
            return None;
        }

        debug!(
            target: "rtms.channel.signaling",
            meeting_id = %self.session.meeting_id,
            sequence = sequence,
            "Signaling handshake sent"
        );
        self.set_state(SignalingState::HandshakeSent);

        Some(socket)
    }

    async fn read_loop(&mut self, socket: &mut RelaySocket) {
        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rtms.channel.signaling",
                        meeting_id = %self.session.meeting_id,
                        "SignalingChannel received cancellation signal"
                    );
                    break;
                }

                Some(message) = self.receiver.recv() => {
                    if let Err(e) = self.handle_message(socket, message).await {
                        warn!(
                            target: "rtms.channel.signaling",
                            meeting_id = %self.session.meeting_id,
                            error = %e,
                            "Signaling write failed"
                        );
                        break;
                    }
                }

                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text(socket, &text).await {
                                warn!(
                                    target: "rtms.channel.signaling",
                                    meeting_id = %self.session.meeting_id,
                                    error = %e,
                                    "Signaling write failed"
                                );
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!(
                                target: "rtms.channel.signaling",
                                meeting_id = %self.session.meeting_id,
                                len = data.len(),
                                "Dropping binary frame"
                            );
                            metrics::record_message_dropped(ROLE.as_str(), "binary");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(
                                target: "rtms.channel.signaling",
                                meeting_id = %self.session.meeting_id,
                                close_frame = ?frame,
                                "Relay closed signaling channel"
                            );
                            break;
                        }
                        // Ping/pong are answered by tungstenite
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(
                                target: "rtms.channel.signaling",
                                meeting_id = %self.session.meeting_id,
                                error = %e,
                                "Signaling read failed"
                            );
                            break;
                        }
                        None => {
                            info!(
                                target: "rtms.channel.signaling",
                                meeting_id = %self.session.meeting_id,
                                "Signaling stream ended"
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Handle a mailbox message. An error means the socket is unusable.
    async fn handle_message(
        &mut self,
        socket: &mut RelaySocket,
        message: SignalingMessage,
    ) -> Result<(), RtmsError> {
        match message {
            SignalingMessage::StartStreaming {
                stream_id,
                respond_to,
            } => {
                let state = *self.state.borrow();
                if state != SignalingState::Established {
                    let _ = respond_to.send(Err(RtmsError::Internal(format!(
                        "signaling channel is {}",
                        state.as_str()
                    ))));
                    return Ok(());
                }

                match transport::send_json(socket, &StartStreamingRequest::new(stream_id.clone()))
                    .await
                {
                    Ok(()) => {
                        info!(
                            target: "rtms.channel.signaling",
                            meeting_id = %self.session.meeting_id,
                            stream_id = %stream_id,
                            "Start streaming requested"
                        );
                        let _ = respond_to.send(Ok(()));
                        Ok(())
                    }
                    Err(e) => {
                        let _ = respond_to.send(Err(RtmsError::Transport(e.to_string())));
                        Err(e)
                    }
                }
            }
        }
    }

    /// Handle one inbound text frame. Only write failures are returned.
    async fn handle_text(&mut self, socket: &mut RelaySocket, text: &str) -> Result<(), RtmsError> {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    error = %e,
                    "Dropping inbound message"
                );
                metrics::record_message_dropped(ROLE.as_str(), e.label());
                return Ok(());
            }
        };

        match message {
            InboundMessage::SignalingHandshakeResponse {
                status_code,
                reason,
                media_server_url,
            } => {
                self.on_handshake_response(socket, status_code, reason, media_server_url)
                    .await
            }

            InboundMessage::KeepAliveRequest { timestamp } => {
                metrics::record_keepalive(ROLE.as_str());
                transport::send_json(socket, &KeepAliveResponse::echo(timestamp)).await
            }

            InboundMessage::EventUpdate { event_type } => {
                info!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    event_type = event_type,
                    event = codes::event_type_name(event_type),
                    "Event update"
                );
                Ok(())
            }

            InboundMessage::StreamStateUpdate { state, stop_reason } => {
                info!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    state = codes::stream_state_name(state),
                    stop_reason = stop_reason.map_or("NONE", codes::stop_reason_name),
                    "Stream state update"
                );
                Ok(())
            }

            InboundMessage::SessionStateUpdate { state, stop_reason } => {
                info!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    state = codes::session_state_name(state),
                    stop_reason = stop_reason.map_or("NONE", codes::stop_reason_name),
                    "Session state update"
                );
                Ok(())
            }

            InboundMessage::Unhandled { msg_type } => {
                debug!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    msg_type = msg_type,
                    "Dropping unhandled message type"
                );
                metrics::record_message_dropped(ROLE.as_str(), "unhandled");
                Ok(())
            }

            other @ (InboundMessage::MediaHandshakeResponse { .. }
            | InboundMessage::MediaData(_)) => {
                debug!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    msg_type = other.msg_type(),
                    "Dropping media-plane message received on signaling"
                );
                metrics::record_message_dropped(ROLE.as_str(), "unexpected");
                Ok(())
            }
        }
    }

    async fn on_handshake_response(
        &mut self,
        socket: &mut RelaySocket,
        status_code: i64,
        reason: Option<String>,
        media_server_url: Option<String>,
    ) -> Result<(), RtmsError> {
        if *self.state.borrow() != SignalingState::HandshakeSent {
            warn!(
                target: "rtms.channel.signaling",
                meeting_id = %self.session.meeting_id,
                state = self.state.borrow().as_str(),
                "Ignoring repeated signaling handshake response"
            );
            metrics::record_message_dropped(ROLE.as_str(), "unexpected");
            return Ok(());
        }

        let media_url = match media_server_url {
            Some(url) if status_code == 0 => url,
            _ => {
                // Stays in HandshakeSent; the relay decides whether to close.
                warn!(
                    target: "rtms.channel.signaling",
                    meeting_id = %self.session.meeting_id,
                    status_code = status_code,
                    status = codes::status_code_name(status_code),
                    reason = reason.as_deref().unwrap_or(""),
                    "Signaling handshake rejected"
                );
                metrics::record_handshake(ROLE.as_str(), false);
                return Ok(());
            }
        };

        metrics::record_handshake(ROLE.as_str(), true);
        self.set_state(SignalingState::Established);
        info!(
            target: "rtms.channel.signaling",
            meeting_id = %self.session.meeting_id,
            media_url = %media_url,
            "Signaling handshake established"
        );

        if !self.context.event_subscriptions.is_empty() {
            let request = EventSubscriptionRequest::subscribe(&self.context.event_subscriptions);
            transport::send_json(socket, &request).await?;
            debug!(
                target: "rtms.channel.signaling",
                meeting_id = %self.session.meeting_id,
                events = ?self.context.event_subscriptions,
                "Event subscription sent"
            );
        }

        if let Err(e) = self
            .registry
            .connect_media(self.session.meeting_id.clone(), self.channel_id, media_url)
            .await
        {
            warn!(
                target: "rtms.channel.signaling",
                meeting_id = %self.session.meeting_id,
                error = %e,
                "Failed to request media channel"
            );
        }

        Ok(())
    }

    fn set_state(&self, state: SignalingState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                target: "rtms.channel.signaling",
                meeting_id = %self.session.meeting_id,
                from = previous.as_str(),
                to = state.as_str(),
                "Signaling state changed"
            );
        }
    }
}
