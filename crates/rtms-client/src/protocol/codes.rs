//! Numeric code tables published by the media relay.
//!
//! These only feed log fields. Nothing in the client branches on a name.

const UNKNOWN: &str = "UNKNOWN";

/// Handshake `status_code` names, indexed by code.
const STATUS_CODES: &[&str] = &[
    "OK",
    "CONNECTION_TIMEOUT",
    "INVALID_JSON_MSG_SIZE",
    "INVALID_JSON_MSG",
    "INVALID_MESSAGE_TYPE",
    "MSG_TYPE_NOT_EXIST",
    "MSG_TYPE_NOT_UINT",
    "MEETING_UUID_NOT_EXIST",
    "MEETING_UUID_NOT_STRING",
    "MEETING_UUID_IS_EMPTY",
    "RTMS_STREAM_ID_NOT_EXIST",
    "RTMS_STREAM_ID_NOT_STRING",
    "RTMS_STREAM_ID_IS_EMPTY",
    "SESSION_NOT_FOUND",
    "SIGNATURE_NOT_EXIST",
    "INVALID_SIGNATURE",
    "INVALID_MEETING_OR_STREAM_ID",
    "DUPLICATE_SIGNAL_REQUEST",
    "EVENTS_NOT_EXIST",
    "EVENTS_VALUE_NOT_ARRAY",
    "EVENT_TYPE_NOT_EXIST",
    "EVENT_TYPE_VALUE_NOT_UINT",
    "MEDIA_TYPE_NOT_EXIST",
    "MEDIA_TYPE_NOT_UINT",
    "MEDIA_TYPE_AUDIO_NOT_SUPPORT",
    "MEDIA_TYPE_VIDEO_NOT_SUPPORT",
    "MEDIA_TYPE_DESKSHARE_NOT_SUPPORT",
    "MEDIA_TYPE_TRANSCRIPT_NOT_SUPPORT",
    "MEDIA_TYPE_CHAT_NOT_SUPPORT",
    "MEDIA_TYPE_INVALID_VALUE",
    "MEDIA_DATA_ALL_CONNECTION_EXIST",
    "DUPLICATE_MEDIA_DATA_CONNECTION",
    "MEDIA_PARAMS_NOT_EXIST",
    "INVALID_MEDIA_PARAMS",
    "NO_MEDIA_TYPE_SPECIFIED",
    "INVALID_MEDIA_AUDIO_PARAMS",
    "MEDIA_AUDIO_CONTENT_TYPE_NOT_UINT",
    "INVALID_MEDIA_AUDIO_CONTENT_TYPE",
    "MEDIA_AUDIO_SAMPLE_RATE_NOT_UINT",
    "INVALID_MEDIA_AUDIO_SAMPLE_RATE",
    "MEDIA_AUDIO_CHANNEL_NOT_UINT",
    "INVALID_MEDIA_AUDIO_CHANNEL",
    "MEDIA_AUDIO_CODEC_NOT_UINT",
    "INVALID_MEDIA_AUDIO_CODEC",
    "MEDIA_AUDIO_DATA_OPT_NOT_UINT",
    "INVALID_MEDIA_AUDIO_DATA_OPT",
    "MEDIA_AUDIO_SEND_RATE_NOT_UINT",
    "MEDIA_AUDIO_FRAME_SIZE_NOT_UINT",
    "INVALID_MEDIA_VIDEO_PARAMS",
    "INVALID_MEDIA_VIDEO_CONTENT_TYPE",
    "MEDIA_VIDEO_CONTENT_TYPE_NOT_UINT",
    "INVALID_MEDIA_VIDEO_CODEC",
    "MEDIA_VIDEO_CODEC_NOT_UINT",
    "INVALID_MEDIA_VIDEO_RESOLUTION",
    "MEDIA_VIDEO_RESOLUTION_NOT_UINT",
    "INVALID_MEDIA_VIDEO_DATA_OPT",
    "MEDIA_VIDEO_DATA_OPT_NOT_UINT",
    "MEDIA_VIDEO_FPS_NOT_UINT",
    "INVALID_MEDIA_SHARE_PARAMS",
    "INVALID_AUDIO_DATA_BUFFER",
    "INVALID_VIDEO_DATA_BUFFER",
    "POST_FIRST_PACKET_FAILURE",
    "RTMS_SESSION_NOT_FOUND",
];

const STREAM_STATES: &[&str] = &["INACTIVE", "ACTIVE", "INTERRUPTED", "TERMINATING", "TERMINATED"];

const SESSION_STATES: &[&str] = &["INACTIVE", "INITIALIZE", "STARTED", "PAUSED", "RESUMED", "STOPPED"];

const STOP_REASONS: &[&str] = &[
    "UNDEFINED",
    "STOP_BC_HOST_TRIGGERED",
    "STOP_BC_USER_TRIGGERED",
    "STOP_BC_USER_LEFT",
    "STOP_BC_USER_EJECTED",
    "STOP_BC_APP_DISABLED_BY_HOST",
    "STOP_BC_MEETING_ENDED",
    "STOP_BC_STREAM_CANCELED",
    "STOP_BC_STREAM_REVOKED",
    "STOP_BC_ALL_APPS_DISABLED",
    "STOP_BC_INTERNAL_EXCEPTION",
    "STOP_BC_CONNECTION_TIMEOUT",
    "STOP_BC_MEETING_CONNECTION_INTERRUPTED",
    "STOP_BC_SIGNAL_CONNECTION_INTERRUPTED",
    "STOP_BC_DATA_CONNECTION_INTERRUPTED",
    "STOP_BC_SIGNAL_CONNECTION_CLOSED_ABNORMALLY",
    "STOP_BC_DATA_CONNECTION_CLOSED_ABNORMALLY",
    "STOP_BC_EXIT_SIGNAL",
    "STOP_BC_AUTHENTICATION_FAILURE",
];

const EVENT_TYPES: &[&str] = &[
    "UNDEFINED",
    "FIRST_PACKET_TIMESTAMP",
    "ACTIVE_SPEAKER_CHANGE",
    "PARTICIPANT_JOIN",
    "PARTICIPANT_LEAVE",
];

fn lookup(table: &'static [&'static str], code: i64) -> &'static str {
    usize::try_from(code)
        .ok()
        .and_then(|index| table.get(index))
        .copied()
        .unwrap_or(UNKNOWN)
}

/// Handshake status code name (`0` is `OK`).
#[must_use]
pub fn status_code_name(code: i64) -> &'static str {
    lookup(STATUS_CODES, code)
}

/// Stream state name carried by msg_type 8.
#[must_use]
pub fn stream_state_name(code: i64) -> &'static str {
    lookup(STREAM_STATES, code)
}

/// Session state name carried by msg_type 9.
#[must_use]
pub fn session_state_name(code: i64) -> &'static str {
    lookup(SESSION_STATES, code)
}

/// Stop reason name shared by stream and session state updates.
#[must_use]
pub fn stop_reason_name(code: i64) -> &'static str {
    lookup(STOP_REASONS, code)
}

/// Event type name used by event subscriptions (msg_type 5/6).
#[must_use]
pub fn event_type_name(code: i64) -> &'static str {
    lookup(EVENT_TYPES, code)
}
