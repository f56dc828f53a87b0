//! Outbound message types.
//!
//! `msg_type` is private and fixed by each constructor, so a request can
//! never be serialized with the wrong discriminator.

use super::MsgType;
use serde::Serialize;
use serde_json::Value;

/// Protocol version sent in both handshakes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Requested media mask: audio, video and transcript.
const MEDIA_TYPE_ALL: u32 = 32;

/// msg_type 1.
#[derive(Debug, Clone, Serialize)]
pub struct SignalingHandshakeRequest {
    msg_type: i64,
    pub protocol_version: u32,
    pub meeting_uuid: String,
    pub rtms_stream_id: String,
    /// Random correlation number, fresh per handshake.
    pub sequence: u32,
    pub signature: String,
}

impl SignalingHandshakeRequest {
    #[must_use]
    pub fn new(
        meeting_uuid: impl Into<String>,
        rtms_stream_id: impl Into<String>,
        sequence: u32,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: MsgType::SignalingHandshakeRequest.code(),
            protocol_version: PROTOCOL_VERSION,
            meeting_uuid: meeting_uuid.into(),
            rtms_stream_id: rtms_stream_id.into(),
            sequence,
            signature: signature.into(),
        }
    }
}

/// Audio capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioParams {
    pub content_type: u32,
    pub sample_rate: u32,
    pub channel: u32,
    pub codec: u32,
    pub data_opt: u32,
    /// Frames per second.
    pub send_rate: u32,
}

impl Default for AudioParams {
    /// RTP content, 16 kHz, mono, L16, mixed stream, 100 frames/s.
    fn default() -> Self {
        Self {
            content_type: 1,
            sample_rate: 1,
            channel: 1,
            codec: 1,
            data_opt: 1,
            send_rate: 100,
        }
    }
}

/// Video capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoParams {
    pub codec: u32,
    pub resolution: u32,
    pub fps: u32,
}

impl Default for VideoParams {
    /// H.264, HD tier, 25 fps.
    fn default() -> Self {
        Self {
            codec: 7,
            resolution: 2,
            fps: 25,
        }
    }
}

/// Fixed media capabilities. Not negotiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaParams {
    pub audio: AudioParams,
    pub video: VideoParams,
}

/// msg_type 3.
#[derive(Debug, Clone, Serialize)]
pub struct MediaHandshakeRequest {
    msg_type: i64,
    pub protocol_version: u32,
    pub meeting_uuid: String,
    pub rtms_stream_id: String,
    pub signature: String,
    pub media_type: u32,
    pub payload_encryption: bool,
    pub media_params: MediaParams,
}

impl MediaHandshakeRequest {
    #[must_use]
    pub fn new(
        meeting_uuid: impl Into<String>,
        rtms_stream_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: MsgType::MediaHandshakeRequest.code(),
            protocol_version: PROTOCOL_VERSION,
            meeting_uuid: meeting_uuid.into(),
            rtms_stream_id: rtms_stream_id.into(),
            signature: signature.into(),
            media_type: MEDIA_TYPE_ALL,
            payload_encryption: false,
            media_params: MediaParams::default(),
        }
    }
}

/// One entry of an event subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventSubscription {
    pub event_type: i64,
    pub subscribe: bool,
}

/// msg_type 5. The relay does not answer it.
#[derive(Debug, Clone, Serialize)]
pub struct EventSubscriptionRequest {
    msg_type: i64,
    pub events: Vec<EventSubscription>,
}

impl EventSubscriptionRequest {
    /// Subscribe to every listed event type.
    #[must_use]
    pub fn subscribe(event_types: &[i64]) -> Self {
        Self {
            msg_type: MsgType::EventSubscription.code(),
            events: event_types
                .iter()
                .map(|&event_type| EventSubscription {
                    event_type,
                    subscribe: true,
                })
                .collect(),
        }
    }
}

/// msg_type 7, sent on the signaling channel once media is ready.
#[derive(Debug, Clone, Serialize)]
pub struct StartStreamingRequest {
    msg_type: i64,
    pub rtms_stream_id: String,
}

impl StartStreamingRequest {
    #[must_use]
    pub fn new(rtms_stream_id: impl Into<String>) -> Self {
        Self {
            msg_type: MsgType::ClientReady.code(),
            rtms_stream_id: rtms_stream_id.into(),
        }
    }
}

/// msg_type 13.
#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveResponse {
    msg_type: i64,
    pub timestamp: Value,
}

impl KeepAliveResponse {
    /// Echo a keepalive request's timestamp unchanged.
    #[must_use]
    pub fn echo(timestamp: Value) -> Self {
        Self {
            msg_type: MsgType::KeepAliveResponse.code(),
            timestamp,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signaling_handshake_wire_shape() {
        let request = SignalingHandshakeRequest::new("m1", "s1", 42, "abcd");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "msg_type": 1,
                "protocol_version": 1,
                "meeting_uuid": "m1",
                "rtms_stream_id": "s1",
                "sequence": 42,
                "signature": "abcd",
            })
        );
    }

    #[test]
    fn test_media_handshake_carries_fixed_capabilities() {
        let request = MediaHandshakeRequest::new("m1", "s1", "abcd");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "msg_type": 3,
                "protocol_version": 1,
                "meeting_uuid": "m1",
                "rtms_stream_id": "s1",
                "signature": "abcd",
                "media_type": 32,
                "payload_encryption": false,
                "media_params": {
                    "audio": {
                        "content_type": 1,
                        "sample_rate": 1,
                        "channel": 1,
                        "codec": 1,
                        "data_opt": 1,
                        "send_rate": 100,
                    },
                    "video": { "codec": 7, "resolution": 2, "fps": 25 },
                },
            })
        );
    }

    #[test]
    fn test_event_subscription_lists_every_type() {
        let request = EventSubscriptionRequest::subscribe(&[2, 3, 4]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["msg_type"], 5);
        assert_eq!(
            value["events"],
            json!([
                { "event_type": 2, "subscribe": true },
                { "event_type": 3, "subscribe": true },
                { "event_type": 4, "subscribe": true },
            ])
        );
    }

    #[test]
    fn test_start_streaming_and_keepalive() {
        assert_eq!(
            serde_json::to_value(StartStreamingRequest::new("s1")).unwrap(),
            json!({ "msg_type": 7, "rtms_stream_id": "s1" })
        );

        let ts = json!(1_727_384_349_000_i64);
        assert_eq!(
            serde_json::to_value(KeepAliveResponse::echo(ts)).unwrap(),
            json!({ "msg_type": 13, "timestamp": 1_727_384_349_000_i64 })
        );
    }
}
