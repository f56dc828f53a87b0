//! Session identity and the context shared by every channel.

use crate::signature;
use crate::sink::FrameSink;

use common::secret::SecretString;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// App credentials used to sign both handshakes.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Handshake signature for one session.
    #[must_use]
    pub fn sign(&self, meeting_id: &str, stream_id: &str) -> String {
        signature::sign(&self.client_id, meeting_id, stream_id, &self.client_secret)
    }
}

/// One RTMS session as announced by the control plane.
///
/// `instance` tells apart two sessions started for the same meeting id, so
/// late messages from a replaced session's channels can be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub meeting_id: String,
    pub stream_id: String,
    /// Signaling endpoint.
    pub server_url: String,
    pub instance: Uuid,
}

impl Session {
    #[must_use]
    pub fn new(
        meeting_id: impl Into<String>,
        stream_id: impl Into<String>,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            stream_id: stream_id.into(),
            server_url: server_url.into(),
            instance: Uuid::new_v4(),
        }
    }
}

/// Process-wide settings every channel reads.
pub struct ClientContext {
    pub credentials: Credentials,
    pub sink: Arc<dyn FrameSink>,
    /// Event types subscribed after a successful signaling handshake.
    pub event_subscriptions: Vec<i64>,
}

impl ClientContext {
    #[must_use]
    pub fn new(credentials: Credentials, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            credentials,
            sink,
            event_subscriptions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_event_subscriptions(mut self, event_types: Vec<i64>) -> Self {
        self.event_subscriptions = event_types;
        self
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("credentials", &self.credentials)
            .field("event_subscriptions", &self.event_subscriptions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LoggingFrameSink;

    #[test]
    fn test_credentials_sign_matches_signature_module() {
        let creds = Credentials::new("client", SecretString::from("shh"));
        assert_eq!(
            creds.sign("m1", "s1"),
            signature::sign("client", "m1", "s1", &SecretString::from("shh"))
        );
    }

    #[test]
    fn test_sessions_for_same_meeting_are_distinct_instances() {
        let a = Session::new("m1", "s1", "wss://relay/sig");
        let b = Session::new("m1", "s1", "wss://relay/sig");
        assert_ne!(a.instance, b.instance);
        assert_ne!(a, b);
    }

    #[test]
    fn test_context_debug_hides_secret() {
        let context = ClientContext::new(
            Credentials::new("client", SecretString::from("do-not-print")),
            Arc::new(LoggingFrameSink),
        )
        .with_event_subscriptions(vec![2, 3]);

        let debug = format!("{context:?}");
        assert!(debug.contains("client"));
        assert!(debug.contains("[2, 3]"));
        assert!(!debug.contains("do-not-print"));
    }
}
