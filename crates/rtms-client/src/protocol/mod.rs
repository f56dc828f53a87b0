//! Relay wire protocol.
//!
//! Every frame on both channels is a JSON object with an integer `msg_type`
//! discriminator. [`decode`] is the single validation step between the
//! socket and the channel state machines: it either yields a typed
//! [`InboundMessage`] or a [`ProtocolError`] describing why the frame was
//! dropped. Nothing past this point touches untyped JSON, except media
//! frame payloads which are forwarded as-is.

pub mod codes;
pub mod messages;

pub use messages::{
    AudioParams, EventSubscription, EventSubscriptionRequest, KeepAliveResponse,
    MediaHandshakeRequest, MediaParams, SignalingHandshakeRequest, StartStreamingRequest,
    VideoParams, PROTOCOL_VERSION,
};

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Message discriminators understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    SignalingHandshakeRequest,
    SignalingHandshakeResponse,
    MediaHandshakeRequest,
    MediaHandshakeResponse,
    EventSubscription,
    EventUpdate,
    ClientReady,
    StreamStateUpdate,
    SessionStateUpdate,
    KeepAliveRequest,
    KeepAliveResponse,
    Audio,
    Video,
    Share,
    Transcript,
}

impl MsgType {
    /// Wire value of this discriminator.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            MsgType::SignalingHandshakeRequest => 1,
            MsgType::SignalingHandshakeResponse => 2,
            MsgType::MediaHandshakeRequest => 3,
            MsgType::MediaHandshakeResponse => 4,
            MsgType::EventSubscription => 5,
            MsgType::EventUpdate => 6,
            MsgType::ClientReady => 7,
            MsgType::StreamStateUpdate => 8,
            MsgType::SessionStateUpdate => 9,
            MsgType::KeepAliveRequest => 12,
            MsgType::KeepAliveResponse => 13,
            MsgType::Audio => 14,
            MsgType::Video => 15,
            MsgType::Share => 16,
            MsgType::Transcript => 17,
        }
    }

    /// Look up a discriminator by wire value.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(MsgType::SignalingHandshakeRequest),
            2 => Some(MsgType::SignalingHandshakeResponse),
            3 => Some(MsgType::MediaHandshakeRequest),
            4 => Some(MsgType::MediaHandshakeResponse),
            5 => Some(MsgType::EventSubscription),
            6 => Some(MsgType::EventUpdate),
            7 => Some(MsgType::ClientReady),
            8 => Some(MsgType::StreamStateUpdate),
            9 => Some(MsgType::SessionStateUpdate),
            12 => Some(MsgType::KeepAliveRequest),
            13 => Some(MsgType::KeepAliveResponse),
            14 => Some(MsgType::Audio),
            15 => Some(MsgType::Video),
            16 => Some(MsgType::Share),
            17 => Some(MsgType::Transcript),
            _ => None,
        }
    }

    /// Stable name for log fields.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            MsgType::SignalingHandshakeRequest => "SIGNALING_HAND_SHAKE_REQ",
            MsgType::SignalingHandshakeResponse => "SIGNALING_HAND_SHAKE_RESP",
            MsgType::MediaHandshakeRequest => "DATA_HAND_SHAKE_REQ",
            MsgType::MediaHandshakeResponse => "DATA_HAND_SHAKE_RESP",
            MsgType::EventSubscription => "EVENT_SUBSCRIPTION",
            MsgType::EventUpdate => "EVENT_UPDATE",
            MsgType::ClientReady => "CLIENT_READY_ACK",
            MsgType::StreamStateUpdate => "STREAM_STATE_UPDATE",
            MsgType::SessionStateUpdate => "SESSION_STATE_UPDATE",
            MsgType::KeepAliveRequest => "KEEP_ALIVE_REQ",
            MsgType::KeepAliveResponse => "KEEP_ALIVE_RESP",
            MsgType::Audio => "MEDIA_DATA_AUDIO",
            MsgType::Video => "MEDIA_DATA_VIDEO",
            MsgType::Share => "MEDIA_DATA_SHARE",
            MsgType::Transcript => "MEDIA_DATA_TRANSCRIPT",
        }
    }
}

/// Why an inbound frame was dropped.
///
/// Both variants are per-message: the read loop logs them and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not JSON, not an object, or no integer `msg_type`.
    #[error("Undecodable message: {0}")]
    Decode(String),

    /// Known `msg_type` whose required fields are missing or mistyped.
    #[error("Malformed msg_type {msg_type}: {reason}")]
    Shape { msg_type: i64, reason: String },
}

impl ProtocolError {
    /// Bounded label for the dropped-messages counter.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            ProtocolError::Decode(_) => "decode",
            ProtocolError::Shape { .. } => "shape",
        }
    }
}

/// Media frame classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Audio,
    Video,
    Share,
    Transcript,
}

impl FrameKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Audio => "audio",
            FrameKind::Video => "video",
            FrameKind::Share => "share",
            FrameKind::Transcript => "transcript",
        }
    }

    /// The discriminator carrying this kind of frame.
    #[must_use]
    pub const fn msg_type(&self) -> MsgType {
        match self {
            FrameKind::Audio => MsgType::Audio,
            FrameKind::Video => MsgType::Video,
            FrameKind::Share => MsgType::Share,
            FrameKind::Transcript => MsgType::Transcript,
        }
    }
}

/// A media frame, classified but not decoded.
///
/// `payload` is the whole inbound JSON object, `msg_type` included.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    pub kind: FrameKind,
    pub payload: Value,
}

impl MediaFrame {
    /// Length of `content.data`, when the frame carries one.
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.payload
            .get("content")
            .and_then(|content| content.get("data"))
            .and_then(Value::as_str)
            .map_or(0, str::len)
    }
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// msg_type 2. `media_server_url` is always set when `status_code == 0`.
    SignalingHandshakeResponse {
        status_code: i64,
        reason: Option<String>,
        media_server_url: Option<String>,
    },
    /// msg_type 4.
    MediaHandshakeResponse {
        status_code: i64,
        reason: Option<String>,
    },
    /// msg_type 6.
    EventUpdate { event_type: i64 },
    /// msg_type 8.
    StreamStateUpdate {
        state: i64,
        stop_reason: Option<i64>,
    },
    /// msg_type 9.
    SessionStateUpdate {
        state: i64,
        stop_reason: Option<i64>,
    },
    /// msg_type 12. The timestamp is kept as raw JSON so the echo is exact.
    KeepAliveRequest { timestamp: Value },
    /// msg_types 14, 15, 16, 17.
    MediaData(MediaFrame),
    /// Integer discriminator this client does not consume.
    Unhandled { msg_type: i64 },
}

impl InboundMessage {
    /// Wire discriminator of this message.
    #[must_use]
    pub fn msg_type(&self) -> i64 {
        match self {
            InboundMessage::SignalingHandshakeResponse { .. } => {
                MsgType::SignalingHandshakeResponse.code()
            }
            InboundMessage::MediaHandshakeResponse { .. } => MsgType::MediaHandshakeResponse.code(),
            InboundMessage::EventUpdate { .. } => MsgType::EventUpdate.code(),
            InboundMessage::StreamStateUpdate { .. } => MsgType::StreamStateUpdate.code(),
            InboundMessage::SessionStateUpdate { .. } => MsgType::SessionStateUpdate.code(),
            InboundMessage::KeepAliveRequest { .. } => MsgType::KeepAliveRequest.code(),
            InboundMessage::MediaData(frame) => frame.kind.msg_type().code(),
            InboundMessage::Unhandled { msg_type } => *msg_type,
        }
    }
}

#[derive(Deserialize)]
struct RawHandshakeResponse {
    #[serde(deserialize_with = "de_wire_int")]
    status_code: i64,
    #[serde(default)]
    reason: Option<Value>,
    #[serde(default)]
    media_server: Option<RawMediaServer>,
}

#[derive(Deserialize)]
struct RawMediaServer {
    server_urls: RawServerUrls,
}

#[derive(Deserialize)]
struct RawServerUrls {
    #[serde(default)]
    all: Option<String>,
}

#[derive(Deserialize)]
struct RawEventUpdate {
    event: RawEvent,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(deserialize_with = "de_wire_int")]
    event_type: i64,
}

#[derive(Deserialize)]
struct RawStateUpdate {
    #[serde(deserialize_with = "de_wire_int")]
    state: i64,
    #[serde(default, deserialize_with = "de_wire_int_opt")]
    stop_reason: Option<i64>,
}

/// Validate one inbound text frame.
///
/// # Errors
///
/// [`ProtocolError::Decode`] when the frame has no usable discriminator,
/// [`ProtocolError::Shape`] when a known discriminator is missing required
/// fields. Unknown integer discriminators are not an error.
pub fn decode(text: &str) -> Result<InboundMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))?;

    if !value.is_object() {
        return Err(ProtocolError::Decode("not a JSON object".to_string()));
    }

    let code = match value.get("msg_type") {
        None | Some(Value::Null) => {
            return Err(ProtocolError::Decode("missing msg_type".to_string()));
        }
        Some(raw) => wire_int(raw)
            .ok_or_else(|| ProtocolError::Decode(format!("msg_type is not an integer: {raw}")))?,
    };

    let Some(msg_type) = MsgType::from_code(code) else {
        return Ok(InboundMessage::Unhandled { msg_type: code });
    };

    match msg_type {
        MsgType::SignalingHandshakeResponse => {
            let raw: RawHandshakeResponse = shape(code, &value)?;
            let media_server_url = raw
                .media_server
                .and_then(|server| server.server_urls.all)
                .filter(|url| !url.is_empty());
            if raw.status_code == 0 && media_server_url.is_none() {
                return Err(ProtocolError::Shape {
                    msg_type: code,
                    reason: "missing media_server.server_urls.all".to_string(),
                });
            }
            Ok(InboundMessage::SignalingHandshakeResponse {
                status_code: raw.status_code,
                reason: raw.reason.and_then(reason_text),
                media_server_url,
            })
        }
        MsgType::MediaHandshakeResponse => {
            let raw: RawHandshakeResponse = shape(code, &value)?;
            Ok(InboundMessage::MediaHandshakeResponse {
                status_code: raw.status_code,
                reason: raw.reason.and_then(reason_text),
            })
        }
        MsgType::EventUpdate => {
            let raw: RawEventUpdate = shape(code, &value)?;
            Ok(InboundMessage::EventUpdate {
                event_type: raw.event.event_type,
            })
        }
        MsgType::StreamStateUpdate => {
            let raw: RawStateUpdate = shape(code, &value)?;
            Ok(InboundMessage::StreamStateUpdate {
                state: raw.state,
                stop_reason: raw.stop_reason,
            })
        }
        MsgType::SessionStateUpdate => {
            let raw: RawStateUpdate = shape(code, &value)?;
            Ok(InboundMessage::SessionStateUpdate {
                state: raw.state,
                stop_reason: raw.stop_reason,
            })
        }
        MsgType::KeepAliveRequest => match value.get("timestamp") {
            None | Some(Value::Null) => Err(ProtocolError::Shape {
                msg_type: code,
                reason: "missing field `timestamp`".to_string(),
            }),
            Some(timestamp) => Ok(InboundMessage::KeepAliveRequest {
                timestamp: timestamp.clone(),
            }),
        },
        MsgType::Audio => Ok(media(FrameKind::Audio, value)),
        MsgType::Video => Ok(media(FrameKind::Video, value)),
        MsgType::Share => Ok(media(FrameKind::Share, value)),
        MsgType::Transcript => Ok(media(FrameKind::Transcript, value)),
        // Outbound-only discriminators are not expected from the relay.
        MsgType::SignalingHandshakeRequest
        | MsgType::MediaHandshakeRequest
        | MsgType::EventSubscription
        | MsgType::ClientReady
        | MsgType::KeepAliveResponse => Ok(InboundMessage::Unhandled { msg_type: code }),
    }
}

/// Integer field as sent by the relay. Whole-number floats (`4.0`) are
/// accepted; fractional values are not.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn wire_int(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn de_wire_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    wire_int(&value).ok_or_else(|| de::Error::custom(format!("expected integer, found {value}")))
}

fn de_wire_int_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => wire_int(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected integer, found {value}"))),
    }
}

fn shape<T: DeserializeOwned>(msg_type: i64, value: &Value) -> Result<T, ProtocolError> {
    T::deserialize(value).map_err(|e| ProtocolError::Shape {
        msg_type,
        reason: e.to_string(),
    })
}

fn media(kind: FrameKind, payload: Value) -> InboundMessage {
    InboundMessage::MediaData(MediaFrame { kind, payload })
}

fn reason_text(reason: Value) -> Option<String> {
    match reason {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_msg_type_codes_round_trip() {
        for code in 1..=17 {
            if let Some(msg_type) = MsgType::from_code(code) {
                assert_eq!(msg_type.code(), code);
            }
        }
        assert_eq!(MsgType::from_code(10), None);
        assert_eq!(MsgType::from_code(11), None);
    }

    #[test]
    fn test_decode_signaling_ack_success() {
        let msg = decode(
            r#"{"msg_type":2,"status_code":0,"media_server":{"server_urls":{"all":"wss://relay/media","audio":"wss://relay/a"}}}"#,
        )
        .unwrap();

        assert_eq!(
            msg,
            InboundMessage::SignalingHandshakeResponse {
                status_code: 0,
                reason: None,
                media_server_url: Some("wss://relay/media".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_signaling_ack_success_without_url_is_shape_error() {
        let err = decode(r#"{"msg_type":2,"status_code":0}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Shape { msg_type: 2, .. }));

        let err = decode(r#"{"msg_type":2,"status_code":0,"media_server":{"server_urls":{}}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Shape { msg_type: 2, .. }));
    }

    #[test]
    fn test_decode_signaling_ack_failure_needs_no_url() {
        let msg = decode(r#"{"msg_type":2,"status_code":15,"reason":"bad signature"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::SignalingHandshakeResponse {
                status_code: 15,
                reason: Some("bad signature".to_string()),
                media_server_url: None,
            }
        );
    }

    #[test]
    fn test_decode_status_code_wrong_type_is_shape_error() {
        let err = decode(r#"{"msg_type":4,"status_code":"0"}"#).unwrap_err();
        assert!(
            matches!(&err, ProtocolError::Shape { msg_type: 4, reason } if reason.contains("invalid type")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_decode_media_ack() {
        let msg = decode(r#"{"msg_type":4,"status_code":0}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::MediaHandshakeResponse {
                status_code: 0,
                reason: None,
            }
        );
    }

    #[test]
    fn test_decode_keepalive_keeps_raw_timestamp() {
        let msg = decode(r#"{"msg_type":12,"timestamp":1727384349000}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::KeepAliveRequest {
                timestamp: json!(1_727_384_349_000_i64)
            }
        );

        let msg = decode(r#"{"msg_type":12,"timestamp":"t-1"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::KeepAliveRequest {
                timestamp: json!("t-1")
            }
        );
    }

    #[test]
    fn test_decode_keepalive_without_timestamp_is_shape_error() {
        let err = decode(r#"{"msg_type":12}"#).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Shape {
                msg_type: 12,
                reason: "missing field `timestamp`".to_string()
            }
        );
    }

    #[test]
    fn test_decode_media_frames_forward_whole_object() {
        let text = r#"{"msg_type":14,"content":{"user_id":7,"data":"AAAA","timestamp":1}}"#;
        let msg = decode(text).unwrap();
        assert_eq!(msg.msg_type(), 14);
        let frame = match msg {
            InboundMessage::MediaData(frame) => frame,
            other => unreachable!("expected media frame, got {other:?}"),
        };
        assert_eq!(frame.kind, FrameKind::Audio);
        assert_eq!(frame.payload, serde_json::from_str::<Value>(text).unwrap());
        assert_eq!(frame.data_len(), 4);

        for (code, kind) in [
            (15, FrameKind::Video),
            (16, FrameKind::Share),
            (17, FrameKind::Transcript),
        ] {
            let msg = decode(&format!(r#"{{"msg_type":{code}}}"#)).unwrap();
            assert!(matches!(msg, InboundMessage::MediaData(MediaFrame { kind: k, .. }) if k == kind));
            assert_eq!(msg.msg_type(), code);
        }
    }

    #[test]
    fn test_decode_state_and_event_updates() {
        assert_eq!(
            decode(r#"{"msg_type":8,"state":4,"stop_reason":6}"#).unwrap(),
            InboundMessage::StreamStateUpdate {
                state: 4,
                stop_reason: Some(6)
            }
        );
        assert_eq!(
            decode(r#"{"msg_type":9,"state":2}"#).unwrap(),
            InboundMessage::SessionStateUpdate {
                state: 2,
                stop_reason: None
            }
        );
        assert_eq!(
            decode(r#"{"msg_type":6,"event":{"event_type":3,"participants":[]}}"#).unwrap(),
            InboundMessage::EventUpdate { event_type: 3 }
        );
        assert!(matches!(
            decode(r#"{"msg_type":6,"event":{}}"#),
            Err(ProtocolError::Shape { msg_type: 6, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_missing_or_non_numeric_msg_type() {
        for text in [
            r#"{"status_code":0}"#,
            r#"{"msg_type":null}"#,
            r#"{"msg_type":"2"}"#,
            r#"{"msg_type":2.5}"#,
            r#"{"msg_type":[2]}"#,
        ] {
            assert!(
                matches!(decode(text), Err(ProtocolError::Decode(_))),
                "expected decode error for {text}"
            );
        }
    }

    #[test]
    fn test_decode_accepts_whole_number_floats() {
        assert_eq!(
            decode(r#"{"msg_type":4.0,"status_code":0}"#).unwrap(),
            InboundMessage::MediaHandshakeResponse {
                status_code: 0,
                reason: None,
            }
        );
        assert_eq!(
            decode(r#"{"msg_type":4,"status_code":0.0}"#).unwrap(),
            InboundMessage::MediaHandshakeResponse {
                status_code: 0,
                reason: None,
            }
        );
        assert_eq!(
            decode(r#"{"msg_type":8,"state":4.0,"stop_reason":6.0}"#).unwrap(),
            InboundMessage::StreamStateUpdate {
                state: 4,
                stop_reason: Some(6),
            }
        );
        assert!(matches!(
            decode(r#"{"msg_type":4,"status_code":0.5}"#),
            Err(ProtocolError::Shape { msg_type: 4, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        for text in ["not json", "", "[1,2]", "42", r#""msg_type""#] {
            assert!(matches!(decode(text), Err(ProtocolError::Decode(_))));
        }
    }

    #[test]
    fn test_decode_unknown_and_outbound_types_are_unhandled() {
        assert_eq!(
            decode(r#"{"msg_type":99}"#).unwrap(),
            InboundMessage::Unhandled { msg_type: 99 }
        );
        assert_eq!(
            decode(r#"{"msg_type":13,"timestamp":1}"#).unwrap(),
            InboundMessage::Unhandled { msg_type: 13 }
        );
    }

    #[test]
    fn test_non_string_reason_is_rendered() {
        let msg = decode(r#"{"msg_type":4,"status_code":33,"reason":{"detail":"x"}}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::MediaHandshakeResponse {
                status_code: 33,
                reason: Some(r#"{"detail":"x"}"#.to_string()),
            }
        );
    }
}
