//! `MediaChannel` - data-plane connection of one session.
//!
//! Spawned by the registry once the signaling handshake has advertised a
//! media server URL. It sends the media handshake (msg 3) with the fixed
//! capability descriptor, answers its own keepalives, and hands every media
//! frame (msg 14/15/16/17) to the [`FrameSink`](crate::sink::FrameSink)
//! without decoding it.
//!
//! On a successful media ack (msg 4) the channel asks the signaling side,
//! through [`StartStreamingRequester`], to send start-streaming. That is the
//! only path that can produce msg 7.
//!
//! A closed media channel does not take the signaling channel down with it.

use crate::errors::RtmsError;
use crate::observability::metrics;
use crate::protocol::{self, codes, InboundMessage, KeepAliveResponse, MediaHandshakeRequest};
use crate::session::{ClientContext, Session};
use crate::transport::{self, RelaySocket};

use super::messages::{ChannelRole, MediaState};
use super::registry::RegistryHandle;

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const ROLE: ChannelRole = ChannelRole::Media;

/// The signaling side as seen from the media channel.
#[async_trait]
pub trait StartStreamingRequester: Send + Sync {
    /// Have msg 7 sent for `stream_id`. Resolves once it is written.
    async fn request_start_streaming(&self, stream_id: &str) -> Result<(), RtmsError>;
}

/// Handle to a `MediaChannel`.
#[derive(Clone, Debug)]
pub struct MediaChannelHandle {
    cancel_token: CancellationToken,
    channel_id: Uuid,
    state: watch::Receiver<MediaState>,
}

impl MediaChannelHandle {
    #[must_use]
    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    #[must_use]
    pub fn state(&self) -> MediaState {
        *self.state.borrow()
    }

    /// Wait until the channel reaches `target`.
    pub async fn wait_for_state(&self, target: MediaState) -> Result<(), RtmsError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| {
                RtmsError::Internal(format!(
                    "media channel exited before reaching {}",
                    target.as_str()
                ))
            })
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `MediaChannel` implementation.
pub struct MediaChannel {
    channel_id: Uuid,
    session: Session,
    media_url: String,
    context: Arc<ClientContext>,
    requester: Arc<dyn StartStreamingRequester>,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    state: watch::Sender<MediaState>,
}

impl MediaChannel {
    /// Spawn the channel task against `media_url`.
    pub fn spawn(
        session: Session,
        media_url: String,
        context: Arc<ClientContext>,
        requester: Arc<dyn StartStreamingRequester>,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> (MediaChannelHandle, JoinHandle<()>) {
        let (state, state_rx) = watch::channel(MediaState::Connecting);
        let channel_id = Uuid::new_v4();

        let channel = Self {
            channel_id,
            session,
            media_url,
            context,
            requester,
            registry,
            cancel_token: cancel_token.clone(),
            state,
        };

        let task_handle = tokio::spawn(channel.run());

        let handle = MediaChannelHandle {
            cancel_token,
            channel_id,
            state: state_rx,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "rtms.channel.media",
        fields(
            meeting_id = %self.session.meeting_id,
            channel_id = %self.channel_id
        )
    )]
    async fn run(mut self) {
        debug!(
            target: "rtms.channel.media",
            meeting_id = %self.session.meeting_id,
            url = %self.media_url,
            "MediaChannel started"
        );

        let mut frames: u64 = 0;

        if let Some(mut socket) = self.open().await {
            frames = self.read_loop(&mut socket).await;
            self.set_state(MediaState::Closed);
            transport::close(socket).await;
            metrics::record_channel_closed(ROLE.as_str());
        }

        if let Err(e) = self
            .registry
            .channel_closed(self.session.meeting_id.clone(), self.channel_id, ROLE)
            .await
        {
            debug!(
                target: "rtms.channel.media",
                meeting_id = %self.session.meeting_id,
                error = %e,
                "Registry gone, closure not reported"
            );
        }

        info!(
            target: "rtms.channel.media",
            meeting_id = %self.session.meeting_id,
            final_state = self.state.borrow().as_str(),
            frames = frames,
            "MediaChannel stopped"
        );
    }

    async fn open(&mut self) -> Option<RelaySocket> {
        let connected = tokio::select! {
            () = self.cancel_token.cancelled() => return None,
            result = transport::connect(&self.media_url) => result,
        };

        let mut socket = match connected {
            Ok(socket) => socket,
            Err(e) => {
                error!(
                    target: "rtms.channel.media",
                    meeting_id = %self.session.meeting_id,
                    error = %e,
                    "Media connect failed"
                );
                metrics::record_connect_failure(ROLE.as_str());
                return None;
            }
        };

        let request = MediaHandshakeRequest::new(
            self.session.meeting_id.clone(),
            self.session.stream_id.clone(),
            self.context
                .credentials
                .sign(&self.session.meeting_id, &self.session.stream_id),
        );

        if let Err(e) = transport::send_json(&mut socket, &request).await {
            warn!(
                target: "rtms.channel.media",
                meeting_id = %self.session.meeting_id,
                error = %e,
                "Failed to send media handshake"
            );
            self.set_state(MediaState::Closed);
            transport::close(socket).await;
            metrics::record_channel_closed(ROLE.as_str());
            return None;
        }

        self.set_state(MediaState::HandshakeSent);
        Some(socket)
    }

    /// Returns the number of frames forwarded.
    async fn read_loop(&mut self, socket: &mut RelaySocket) -> u64 {
        let mut frames: u64 = 0;

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rtms.channel.media",
                        meeting_id = %self.session.meeting_id,
                        "MediaChannel received cancellation signal"
                    );
                    break;
                }

                frame = socket.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_text(socket, &text).await {
                                Ok(true) => frames += 1,
                                Ok(false) => {}
                                Err(e) => {
                                    warn!(
                                        target: "rtms.channel.media",
                                        meeting_id = %self.session.meeting_id,
                                        error = %e,
                                        "Media write failed"
                                    );
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!(
                                target: "rtms.channel.media",
                                meeting_id = %self.session.meeting_id,
                                len = data.len(),
                                "Dropping binary frame"
                            );
                            metrics::record_message_dropped(ROLE.as_str(), "binary");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(
                                target: "rtms.channel.media",
                                meeting_id = %self.session.meeting_id,
                                close_frame = ?frame,
                                "Relay closed media channel"
                            );
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(
                                target: "rtms.channel.media",
                                meeting_id = %self.session.meeting_id,
                                error = %e,
                                "Media read failed"
                            );
                            break;
                        }
                        None => {
                            info!(
                                target: "rtms.channel.media",
                                meeting_id = %self.session.meeting_id,
                                "Media stream ended"
                            );
                            break;
                        }
                    }
                }
            }
        }

        frames
    }

    /// Handle one inbound text frame.
    ///
    /// Returns whether a media frame was forwarded. Only write failures are
    /// returned as errors.
    async fn handle_text(&mut self, socket: &mut RelaySocket, text: &str) -> Result<bool, RtmsError> {
        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    target: "rtms.channel.media",
                    meeting_id = %self.session.meeting_id,
                    error = %e,
                    "Dropping inbound message"
                );
                metrics::record_message_dropped(ROLE.as_str(), e.label());
                return Ok(false);
            }
        };

        match message {
            InboundMessage::MediaData(frame) => {
                metrics::record_frame(frame.kind.as_str());
                self.context.sink.on_frame(&self.session.meeting_id, frame);
                Ok(true)
            }

            InboundMessage::KeepAliveRequest { timestamp } => {
                metrics::record_keepalive(ROLE.as_str());
                transport::send_json(socket, &KeepAliveResponse::echo(timestamp)).await?;
                Ok(false)
            }

            InboundMessage::MediaHandshakeResponse {
                status_code,
                reason,
            } => {
                self.on_handshake_response(status_code, reason).await;
                Ok(false)
            }

            InboundMessage::Unhandled { msg_type } => {
                debug!(
                    target: "rtms.channel.media",
                    meeting_id = %self.session.meeting_id,
                    msg_type = msg_type,
                    "Dropping unhandled message type"
                );
                metrics::record_message_dropped(ROLE.as_str(), "unhandled");
                Ok(false)
            }

            other => {
                debug!(
                    target: "rtms.channel.media",
                    meeting_id = %self.session.meeting_id,
                    msg_type = other.msg_type(),
                    "Dropping signaling-plane message received on media"
                );
                metrics::record_message_dropped(ROLE.as_str(), "unexpected");
                Ok(false)
            }
        }
    }

    async fn on_handshake_response(&mut self, status_code: i64, reason: Option<String>) {
        if *self.state.borrow() != MediaState::HandshakeSent {
            warn!(
                target: "rtms.channel.media",
                meeting_id = %self.session.meeting_id,
                state = self.state.borrow().as_str(),
                "Ignoring repeated media handshake response"
            );
            metrics::record_message_dropped(ROLE.as_str(), "unexpected");
            return;
        }

        if status_code != 0 {
            warn!(
                target: "rtms.channel.media",
                meeting_id = %self.session.meeting_id,
                status_code = status_code,
                status = codes::status_code_name(status_code),
                reason = reason.as_deref().unwrap_or(""),
                "Media handshake rejected"
            );
            metrics::record_handshake(ROLE.as_str(), false);
            return;
        }

        metrics::record_handshake(ROLE.as_str(), true);
        self.set_state(MediaState::Established);

        match self
            .requester
            .request_start_streaming(&self.session.stream_id)
            .await
        {
            Ok(()) => {
                self.set_state(MediaState::Streaming);
                info!(
                    target: "rtms.channel.media",
                    meeting_id = %self.session.meeting_id,
                    stream_id = %self.session.stream_id,
                    "Media streaming"
                );
            }
            Err(e) => {
                warn!(
                    target: "rtms.channel.media",
                    meeting_id = %self.session.meeting_id,
                    error = %e,
                    "Start streaming request failed"
                );
            }
        }
    }

    fn set_state(&self, state: MediaState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(
                target: "rtms.channel.media",
                meeting_id = %self.session.meeting_id,
                from = previous.as_str(),
                to = state.as_str(),
                "Media state changed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::registry::SessionRegistry;
    use crate::protocol::{FrameKind, MediaFrame};
    use crate::session::Credentials;
    use crate::sink::FrameSink;
    use common::secret::SecretString;
    use rtms_test_utils::{fixtures, MockRelay};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    /// Stands in for the signaling channel.
    struct RecordingRequester {
        calls: mpsc::UnboundedSender<String>,
        fail: bool,
    }

    #[async_trait]
    impl StartStreamingRequester for RecordingRequester {
        async fn request_start_streaming(&self, stream_id: &str) -> Result<(), RtmsError> {
            let _ = self.calls.send(stream_id.to_string());
            if self.fail {
                Err(RtmsError::Internal("signaling channel is closed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<MediaFrame>);

    impl FrameSink for ChannelSink {
        fn on_frame(&self, _meeting_id: &str, frame: MediaFrame) {
            let _ = self.0.send(frame);
        }
    }

    struct Harness {
        handle: MediaChannelHandle,
        calls: mpsc::UnboundedReceiver<String>,
        frames: mpsc::UnboundedReceiver<MediaFrame>,
    }

    fn spawn_channel(url: String, fail: bool) -> Harness {
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (call_tx, calls) = mpsc::unbounded_channel();

        let context = Arc::new(ClientContext::new(
            Credentials::new(
                fixtures::TEST_CLIENT_ID,
                SecretString::from(fixtures::TEST_CLIENT_SECRET),
            ),
            Arc::new(ChannelSink(frame_tx)),
        ));
        let (registry, _registry_task) =
            SessionRegistry::spawn(Arc::clone(&context), CancellationToken::new());

        let (handle, _task) = MediaChannel::spawn(
            Session::new("m1", "s1", "ws://unused"),
            url,
            context,
            Arc::new(RecordingRequester {
                calls: call_tx,
                fail,
            }),
            registry,
            CancellationToken::new(),
        );

        Harness {
            handle,
            calls,
            frames,
        }
    }

    async fn wait_state(handle: &MediaChannelHandle, target: MediaState) {
        tokio::time::timeout(WAIT, handle.wait_for_state(target))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sends_media_handshake() {
        let mut relay = MockRelay::start().await.unwrap();
        let harness = spawn_channel(relay.url(), false);

        let mut conn = relay.accept().await;
        let hello = conn.recv_json().await;

        assert_eq!(hello["msg_type"], 3);
        assert_eq!(hello["protocol_version"], 1);
        assert_eq!(hello["meeting_uuid"], "m1");
        assert_eq!(hello["rtms_stream_id"], "s1");
        assert_eq!(hello["media_type"], 32);
        assert_eq!(hello["payload_encryption"], false);
        assert_eq!(hello["media_params"]["audio"]["send_rate"], 100);
        assert_eq!(hello["media_params"]["video"]["fps"], 25);
        assert!(fixtures::signature_is_valid(
            &hello,
            fixtures::TEST_CLIENT_ID,
            fixtures::TEST_CLIENT_SECRET
        ));

        wait_state(&harness.handle, MediaState::HandshakeSent).await;
        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_ack_requests_start_streaming() {
        let mut relay = MockRelay::start().await.unwrap();
        let mut harness = spawn_channel(relay.url(), false);

        let mut conn = relay.accept().await;
        let _hello = conn.recv_json().await;
        assert!(harness.calls.try_recv().is_err());

        conn.send_json(&fixtures::media_ack());

        let stream_id = tokio::time::timeout(WAIT, harness.calls.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stream_id, "s1");
        wait_state(&harness.handle, MediaState::Streaming).await;

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_rejected_ack_never_requests_streaming() {
        let mut relay = MockRelay::start().await.unwrap();
        let mut harness = spawn_channel(relay.url(), false);

        let mut conn = relay.accept().await;
        let _hello = conn.recv_json().await;
        conn.send_json(&fixtures::media_ack_rejected(7));

        // Round trip so the ack has been handled
        conn.send_json(&fixtures::keepalive_request(5));
        assert_eq!(conn.recv_json().await["timestamp"], 5);

        assert!(harness.calls.try_recv().is_err());
        assert_eq!(harness.handle.state(), MediaState::HandshakeSent);

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_failed_request_stays_established() {
        let mut relay = MockRelay::start().await.unwrap();
        let mut harness = spawn_channel(relay.url(), true);

        let mut conn = relay.accept().await;
        let _hello = conn.recv_json().await;
        conn.send_json(&fixtures::media_ack());

        tokio::time::timeout(WAIT, harness.calls.recv())
            .await
            .unwrap()
            .unwrap();

        conn.send_json(&fixtures::keepalive_request(6));
        assert_eq!(conn.recv_json().await["timestamp"], 6);
        assert_eq!(harness.handle.state(), MediaState::Established);

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_frames_reach_sink_in_order() {
        let mut relay = MockRelay::start().await.unwrap();
        let mut harness = spawn_channel(relay.url(), false);

        let mut conn = relay.accept().await;
        let _hello = conn.recv_json().await;
        conn.send_json(&fixtures::media_ack());
        wait_state(&harness.handle, MediaState::Streaming).await;

        conn.send_json(&fixtures::media_frame(14, "YXVkaW8="));
        conn.send_json(&fixtures::media_frame(15, "dmlkZW8="));
        conn.send_json(&fixtures::media_frame(16, "c2hhcmU="));
        conn.send_json(&fixtures::media_frame(17, "hello"));

        let mut kinds = Vec::new();
        for _ in 0..4 {
            let frame = tokio::time::timeout(WAIT, harness.frames.recv())
                .await
                .unwrap()
                .unwrap();
            kinds.push(frame.kind);
        }
        assert_eq!(
            kinds,
            vec![
                FrameKind::Audio,
                FrameKind::Video,
                FrameKind::Share,
                FrameKind::Transcript
            ]
        );

        harness.handle.cancel();
    }

    #[tokio::test]
    async fn test_media_close_does_not_request_anything() {
        let mut relay = MockRelay::start().await.unwrap();
        let mut harness = spawn_channel(relay.url(), false);

        let mut conn = relay.accept().await;
        let _hello = conn.recv_json().await;
        conn.close();

        wait_state(&harness.handle, MediaState::Closed).await;
        assert!(harness.calls.try_recv().is_err());
    }
}
