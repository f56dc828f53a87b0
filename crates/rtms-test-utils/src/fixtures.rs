//! Relay frames and webhook bodies used across tests.

use common::hmac::verify_hmac_sha256_hex;
use serde_json::{json, Value};

pub const TEST_CLIENT_ID: &str = "test-client-id";
pub const TEST_CLIENT_SECRET: &str = "test-client-secret";
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Successful signaling ack advertising `media_url`.
#[must_use]
pub fn signaling_ack(media_url: &str) -> Value {
    json!({
        "msg_type": 2,
        "protocol_version": 1,
        "status_code": 0,
        "reason": "",
        "media_server": {
            "server_urls": {
                "audio": media_url,
                "video": media_url,
                "transcript": media_url,
                "all": media_url,
            },
            "srtp_keys": {}
        }
    })
}

#[must_use]
pub fn signaling_ack_rejected(status_code: i64) -> Value {
    json!({ "msg_type": 2, "status_code": status_code, "reason": "rejected" })
}

#[must_use]
pub fn media_ack() -> Value {
    json!({ "msg_type": 4, "protocol_version": 1, "status_code": 0, "reason": "" })
}

#[must_use]
pub fn media_ack_rejected(status_code: i64) -> Value {
    json!({ "msg_type": 4, "status_code": status_code, "reason": "rejected" })
}

#[must_use]
pub fn keepalive_request(timestamp: i64) -> Value {
    json!({ "msg_type": 12, "timestamp": timestamp })
}

/// Media frame of `msg_type` (14 audio, 15 video, 16 share, 17 transcript).
#[must_use]
pub fn media_frame(msg_type: i64, data: &str) -> Value {
    json!({
        "msg_type": msg_type,
        "content": {
            "user_id": 16_778_240,
            "user_name": "Test User",
            "data": data,
            "timestamp": 1_727_384_349_000_i64,
        }
    })
}

#[must_use]
pub fn stream_state_update(state: i64, stop_reason: i64) -> Value {
    json!({ "msg_type": 8, "state": state, "stop_reason": stop_reason })
}

/// `meeting.rtms_started` webhook body.
#[must_use]
pub fn rtms_started_event(meeting_uuid: &str, stream_id: &str, server_urls: &str) -> Value {
    json!({
        "event": "meeting.rtms_started",
        "event_ts": 1_727_384_349_000_i64,
        "payload": {
            "meeting_uuid": meeting_uuid,
            "rtms_stream_id": stream_id,
            "server_urls": server_urls,
        }
    })
}

/// `meeting.rtms_stopped` webhook body.
#[must_use]
pub fn rtms_stopped_event(meeting_uuid: &str) -> Value {
    json!({
        "event": "meeting.rtms_stopped",
        "payload": { "meeting_uuid": meeting_uuid }
    })
}

/// `endpoint.url_validation` webhook body.
#[must_use]
pub fn url_validation_event(plain_token: &str) -> Value {
    json!({
        "event": "endpoint.url_validation",
        "payload": { "plainToken": plain_token }
    })
}

/// Check a handshake's `signature` against its own meeting and stream ids.
#[must_use]
pub fn signature_is_valid(handshake: &Value, client_id: &str, client_secret: &str) -> bool {
    let (Some(meeting), Some(stream), Some(signature)) = (
        handshake.get("meeting_uuid").and_then(Value::as_str),
        handshake.get("rtms_stream_id").and_then(Value::as_str),
        handshake.get("signature").and_then(Value::as_str),
    ) else {
        return false;
    };

    let message = format!("{client_id},{meeting},{stream}");
    verify_hmac_sha256_hex(client_secret.as_bytes(), message.as_bytes(), signature)
}
