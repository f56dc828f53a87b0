//! `SessionController` - session lifecycle entry points.
//!
//! Translates session start and stop events into registry operations and
//! owns the one step the registry never does itself: awaiting channel
//! tasks. A repeated start for an active meeting is a takeover; the
//! previous session's channels are closed and awaited before the start
//! call returns. Once [`SessionController::shutdown`] begins, starts are
//! refused with [`RtmsError::ShuttingDown`].

use crate::actors::{ManagedSession, RegistryHandle, SessionInfo, SessionRegistry};
use crate::errors::RtmsError;
use crate::session::{ClientContext, Session};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Drives sessions through the registry.
#[derive(Clone, Debug)]
pub struct SessionController {
    registry: RegistryHandle,
    close_timeout: Duration,
    /// Cancelled when shutdown begins; shared by every clone.
    shutting_down: CancellationToken,
}

impl SessionController {
    /// Wrap an existing registry.
    #[must_use]
    pub fn new(registry: RegistryHandle, close_timeout: Duration) -> Self {
        Self {
            registry,
            close_timeout,
            shutting_down: CancellationToken::new(),
        }
    }

    /// Spawn a registry under `cancel_token` and wrap it.
    pub fn spawn(
        context: Arc<ClientContext>,
        close_timeout: Duration,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (registry, task) = SessionRegistry::spawn(context, cancel_token);
        (Self::new(registry, close_timeout), task)
    }

    #[must_use]
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Register a session and start its signaling channel against
    /// `server_url`. Returns once the session is registered; the channels
    /// proceed on their own tasks.
    #[instrument(skip_all, name = "rtms.controller.start", fields(meeting_id = %meeting_id))]
    pub async fn on_session_start(
        &self,
        meeting_id: &str,
        stream_id: &str,
        server_url: &str,
    ) -> Result<(), RtmsError> {
        if self.shutting_down.is_cancelled() {
            warn!(
                target: "rtms.controller",
                meeting_id = %meeting_id,
                "Refusing session start during shutdown"
            );
            return Err(RtmsError::ShuttingDown);
        }

        let session = Session::new(meeting_id, stream_id, server_url);

        info!(
            target: "rtms.controller",
            meeting_id = %meeting_id,
            stream_id = %stream_id,
            "Starting session"
        );

        if let Some(previous) = self.registry.start_session(session).await? {
            info!(
                target: "rtms.controller",
                meeting_id = %meeting_id,
                previous_stream_id = %previous.session().stream_id,
                "Closing session taken over by restart"
            );
            self.close(previous).await;
        }

        // Shutdown may have drained the registry while this start was in
        // flight; the session must not outlive it.
        if self.shutting_down.is_cancelled() {
            if let Ok(Some(managed)) = self.registry.remove_session(meeting_id.to_string()).await {
                self.close(managed).await;
            }
            return Err(RtmsError::ShuttingDown);
        }

        Ok(())
    }

    /// Close every channel of `meeting_id` and drop it from the registry.
    /// No-op if the meeting has no session.
    #[instrument(skip_all, name = "rtms.controller.stop", fields(meeting_id = %meeting_id))]
    pub async fn on_session_stop(&self, meeting_id: &str) -> Result<(), RtmsError> {
        match self.registry.remove_session(meeting_id.to_string()).await? {
            Some(managed) => {
                self.close(managed).await;
                info!(target: "rtms.controller", meeting_id = %meeting_id, "Session stopped");
            }
            None => {
                debug!(
                    target: "rtms.controller",
                    meeting_id = %meeting_id,
                    "Stop for unknown session, ignoring"
                );
            }
        }

        Ok(())
    }

    /// Snapshot of a running session.
    pub async fn session_info(&self, meeting_id: &str) -> Result<SessionInfo, RtmsError> {
        self.registry
            .get_session(meeting_id.to_string())
            .await?
            .ok_or_else(|| RtmsError::SessionNotFound(meeting_id.to_string()))
    }

    /// Close every session. Returns the number closed.
    #[instrument(skip_all, name = "rtms.controller.close_all")]
    pub async fn close_all(&self) -> Result<usize, RtmsError> {
        let sessions = self.registry.drain().await?;
        let count = sessions.len();

        futures_util::future::join_all(sessions.into_iter().map(|managed| self.close(managed)))
            .await;

        info!(target: "rtms.controller", sessions = count, "All sessions closed");
        Ok(count)
    }

    /// Refuse new sessions, close the running ones, then stop the registry.
    pub async fn shutdown(&self) {
        self.shutting_down.cancel();

        if let Err(e) = self.close_all().await {
            warn!(
                target: "rtms.controller",
                error = %e,
                "Registry unavailable during shutdown"
            );
        }
        self.registry.cancel();
    }

    async fn close(&self, managed: ManagedSession) {
        managed.close(self.close_timeout).await;
    }
}
