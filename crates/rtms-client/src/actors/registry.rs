//! `SessionRegistry` - single owner of the `meeting_id -> session` table.
//!
//! Every mutation goes through this actor's mailbox: session start and stop
//! from the controller, media dial requests and closure reports from the
//! channels. The registry spawns both channels itself, so a channel is in
//! the table before it can report anything about itself.
//!
//! The registry never awaits a channel task. Sessions leave the table as
//! [`ManagedSession`] values and the caller closes them with
//! [`ManagedSession::close`].
//!
//! # Self-removal
//!
//! A session whose signaling and media channels have both exited is removed
//! on the closure report of the last one. Reports carry the channel id, so
//! a late report from a replaced session never touches its successor.

use crate::errors::RtmsError;
use crate::observability::metrics;
use crate::session::{ClientContext, Session};

use super::media::{MediaChannel, MediaChannelHandle};
use super::messages::{ChannelRole, RegistryMessage, RegistryStatus, SessionInfo};
use super::signaling::{SignalingChannel, SignalingChannelHandle};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `SessionRegistry`.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RegistryHandle {
    /// Register `session` and spawn its signaling channel.
    ///
    /// Returns the session previously registered under the same meeting id.
    /// It is no longer in the table; the caller must close it.
    pub async fn start_session(&self, session: Session) -> Result<Option<ManagedSession>, RtmsError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::StartSession {
                session,
                registry: self.clone(),
                respond_to: tx,
            })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RtmsError::Internal(format!("response receive failed: {e}")))
    }

    /// Ask for a media channel on `media_url`. Fire-and-forget.
    ///
    /// Ignored unless `signaling_channel_id` is still the session's signaling
    /// channel.
    pub async fn connect_media(
        &self,
        meeting_id: String,
        signaling_channel_id: Uuid,
        media_url: String,
    ) -> Result<(), RtmsError> {
        self.sender
            .send(RegistryMessage::ConnectMedia {
                meeting_id,
                signaling_channel_id,
                media_url,
                registry: self.clone(),
            })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))
    }

    /// Report that a channel task is exiting. Fire-and-forget.
    pub async fn channel_closed(
        &self,
        meeting_id: String,
        channel_id: Uuid,
        role: ChannelRole,
    ) -> Result<(), RtmsError> {
        self.sender
            .send(RegistryMessage::ChannelClosed {
                meeting_id,
                channel_id,
                role,
            })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))
    }

    /// Take a session out of the table. `None` if it is not registered.
    pub async fn remove_session(&self, meeting_id: String) -> Result<Option<ManagedSession>, RtmsError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::RemoveSession {
                meeting_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RtmsError::Internal(format!("response receive failed: {e}")))
    }

    /// Take every session out of the table.
    pub async fn drain(&self) -> Result<Vec<ManagedSession>, RtmsError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Drain { respond_to: tx })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RtmsError::Internal(format!("response receive failed: {e}")))
    }

    /// Snapshot of one session.
    pub async fn get_session(&self, meeting_id: String) -> Result<Option<SessionInfo>, RtmsError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetSession {
                meeting_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RtmsError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn status(&self) -> Result<RegistryStatus, RtmsError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RtmsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RtmsError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the registry and, through child tokens, every channel.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

struct ChannelSlot<H> {
    handle: H,
    task: JoinHandle<()>,
}

/// A session and the channel tasks it owns.
pub struct ManagedSession {
    session: Session,
    /// Root of both channel tokens.
    cancel_token: CancellationToken,
    signaling: Option<ChannelSlot<SignalingChannelHandle>>,
    media: Option<ChannelSlot<MediaChannelHandle>>,
}

impl ManagedSession {
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            meeting_id: self.session.meeting_id.clone(),
            stream_id: self.session.stream_id.clone(),
            signaling: self.signaling.as_ref().map(|slot| slot.handle.state()),
            media: self.media.as_ref().map(|slot| slot.handle.state()),
        }
    }

    /// Close every channel and wait for their tasks, each bounded by
    /// `timeout`. Cancelling the session token closes both sockets.
    pub async fn close(self, timeout: Duration) {
        self.cancel_token.cancel();

        let tasks = [
            self.signaling.map(|slot| (ChannelRole::Signaling, slot.task)),
            self.media.map(|slot| (ChannelRole::Media, slot.task)),
        ];

        for (role, task) in tasks.into_iter().flatten() {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "rtms.actor.registry",
                        meeting_id = %self.session.meeting_id,
                        channel = role.as_str(),
                        "Channel task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "rtms.actor.registry",
                        meeting_id = %self.session.meeting_id,
                        channel = role.as_str(),
                        error = ?e,
                        "Channel task panicked during close"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "rtms.actor.registry",
                        meeting_id = %self.session.meeting_id,
                        channel = role.as_str(),
                        "Channel task close timed out"
                    );
                }
            }
        }
    }
}

/// The `SessionRegistry` actor.
pub struct SessionRegistry {
    receiver: mpsc::Receiver<RegistryMessage>,
    cancel_token: CancellationToken,
    context: Arc<ClientContext>,
    sessions: HashMap<String, ManagedSession>,
}

impl SessionRegistry {
    /// Spawn the registry. Session tokens are children of `cancel_token`.
    pub fn spawn(
        context: Arc<ClientContext>,
        cancel_token: CancellationToken,
    ) -> (RegistryHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);

        let actor = Self {
            receiver,
            cancel_token: cancel_token.clone(),
            context,
            sessions: HashMap::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        (
            RegistryHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    #[instrument(skip_all, name = "rtms.actor.registry")]
    async fn run(mut self) {
        info!(target: "rtms.actor.registry", "SessionRegistry started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rtms.actor.registry",
                        sessions = self.sessions.len(),
                        "SessionRegistry received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(
                                target: "rtms.actor.registry",
                                "SessionRegistry channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        // Channel tokens are children of ours; dropping the slots detaches
        // tasks that are already shutting down.
        for managed in self.sessions.values() {
            managed.cancel_token.cancel();
        }
        self.sessions.clear();
        metrics::set_sessions_active(0);

        info!(target: "rtms.actor.registry", "SessionRegistry stopped");
    }

    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::StartSession {
                session,
                registry,
                respond_to,
            } => {
                let displaced = self.start_session(session, registry);
                if let Err(Some(displaced)) = respond_to.send(displaced) {
                    // Caller went away; still close what it would have closed.
                    displaced.cancel_token.cancel();
                }
            }

            RegistryMessage::ConnectMedia {
                meeting_id,
                signaling_channel_id,
                media_url,
                registry,
            } => {
                self.connect_media(&meeting_id, signaling_channel_id, media_url, registry);
            }

            RegistryMessage::ChannelClosed {
                meeting_id,
                channel_id,
                role,
            } => {
                self.channel_closed(&meeting_id, channel_id, role);
            }

            RegistryMessage::RemoveSession {
                meeting_id,
                respond_to,
            } => {
                let removed = self.sessions.remove(&meeting_id);
                if removed.is_some() {
                    metrics::set_sessions_active(self.sessions.len());
                    debug!(
                        target: "rtms.actor.registry",
                        meeting_id = %meeting_id,
                        total_sessions = self.sessions.len(),
                        "Session removed"
                    );
                }
                if let Err(Some(removed)) = respond_to.send(removed) {
                    removed.cancel_token.cancel();
                }
            }

            RegistryMessage::Drain { respond_to } => {
                let drained: Vec<ManagedSession> =
                    self.sessions.drain().map(|(_, managed)| managed).collect();
                metrics::set_sessions_active(0);
                if let Err(drained) = respond_to.send(drained) {
                    for managed in drained {
                        managed.cancel_token.cancel();
                    }
                }
            }

            RegistryMessage::GetSession {
                meeting_id,
                respond_to,
            } => {
                let info = self.sessions.get(&meeting_id).map(ManagedSession::info);
                let _ = respond_to.send(info);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    session_count: self.sessions.len(),
                });
            }
        }
    }

    fn start_session(&mut self, session: Session, registry: RegistryHandle) -> Option<ManagedSession> {
        let meeting_id = session.meeting_id.clone();
        let cancel_token = self.cancel_token.child_token();

        let (handle, task) = SignalingChannel::spawn(
            session.clone(),
            Arc::clone(&self.context),
            registry,
            cancel_token.child_token(),
        );

        let displaced = self.sessions.insert(
            meeting_id.clone(),
            ManagedSession {
                session,
                cancel_token,
                signaling: Some(ChannelSlot { handle, task }),
                media: None,
            },
        );

        metrics::record_session_started();
        metrics::set_sessions_active(self.sessions.len());

        if displaced.is_some() {
            warn!(
                target: "rtms.actor.registry",
                meeting_id = %meeting_id,
                "Session restarted, replacing previous session"
            );
        }

        info!(
            target: "rtms.actor.registry",
            meeting_id = %meeting_id,
            total_sessions = self.sessions.len(),
            "Session registered"
        );

        displaced
    }

    fn connect_media(
        &mut self,
        meeting_id: &str,
        signaling_channel_id: Uuid,
        media_url: String,
        registry: RegistryHandle,
    ) {
        let Some(managed) = self.sessions.get_mut(meeting_id) else {
            debug!(
                target: "rtms.actor.registry",
                meeting_id = %meeting_id,
                "Media requested for unknown session, ignoring"
            );
            return;
        };

        let requester = match &managed.signaling {
            Some(slot) if slot.handle.channel_id() == signaling_channel_id => {
                Arc::new(slot.handle.clone())
            }
            _ => {
                debug!(
                    target: "rtms.actor.registry",
                    meeting_id = %meeting_id,
                    "Media requested by stale signaling channel, ignoring"
                );
                return;
            }
        };

        let (handle, task) = MediaChannel::spawn(
            managed.session.clone(),
            media_url,
            Arc::clone(&self.context),
            requester,
            registry,
            managed.cancel_token.child_token(),
        );

        if let Some(previous) = managed.media.replace(ChannelSlot { handle, task }) {
            // At most one media channel per session
            warn!(
                target: "rtms.actor.registry",
                meeting_id = %meeting_id,
                "Replacing existing media channel"
            );
            previous.handle.cancel();
        }

        debug!(
            target: "rtms.actor.registry",
            meeting_id = %meeting_id,
            "Media channel spawned"
        );
    }

    fn channel_closed(&mut self, meeting_id: &str, channel_id: Uuid, role: ChannelRole) {
        let Some(managed) = self.sessions.get_mut(meeting_id) else {
            debug!(
                target: "rtms.actor.registry",
                meeting_id = %meeting_id,
                channel = role.as_str(),
                "Closure reported for unknown session"
            );
            return;
        };

        let cleared = match role {
            ChannelRole::Signaling => {
                take_if_matches(&mut managed.signaling, channel_id, |h| h.channel_id())
            }
            ChannelRole::Media => {
                take_if_matches(&mut managed.media, channel_id, |h| h.channel_id())
            }
        };

        if !cleared {
            debug!(
                target: "rtms.actor.registry",
                meeting_id = %meeting_id,
                channel = role.as_str(),
                "Stale closure report, ignoring"
            );
            return;
        }

        debug!(
            target: "rtms.actor.registry",
            meeting_id = %meeting_id,
            channel = role.as_str(),
            "Channel closed"
        );

        if managed.signaling.is_none() && managed.media.is_none() {
            if let Some(managed) = self.sessions.remove(meeting_id) {
                managed.cancel_token.cancel();
            }
            metrics::set_sessions_active(self.sessions.len());
            info!(
                target: "rtms.actor.registry",
                meeting_id = %meeting_id,
                total_sessions = self.sessions.len(),
                "All channels closed, session removed"
            );
        }
    }
}

fn take_if_matches<H>(
    slot: &mut Option<ChannelSlot<H>>,
    channel_id: Uuid,
    id_of: impl Fn(&H) -> Uuid,
) -> bool {
    if slot.as_ref().is_some_and(|s| id_of(&s.handle) == channel_id) {
        *slot = None;
        true
    } else {
        false
    }
}
