//! Metrics definitions for the RTMS client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rtms_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded enums, never ids:
//! - `channel`: 2 values (signaling, media)
//! - `outcome`: 2 values (success, failure)
//! - `kind`: 4 values (audio, video, share, transcript)
//! - `reason`: bounded drop reasons (decode, shape, unhandled, unexpected, binary)

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Set the number of registered sessions.
///
/// Metric: `rtms_sessions_active`
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("rtms_sessions_active").set(count as f64);
}

/// Metric: `rtms_sessions_started_total`
pub fn record_session_started() {
    counter!("rtms_sessions_started_total").increment(1);
}

// ============================================================================
// Channel Metrics
// ============================================================================

/// A dial to the relay failed.
///
/// Metric: `rtms_channel_connect_failures_total`
/// Labels: `channel`
pub fn record_connect_failure(channel: &'static str) {
    counter!("rtms_channel_connect_failures_total", "channel" => channel).increment(1);
}

/// A handshake response was received.
///
/// Metric: `rtms_handshakes_total`
/// Labels: `channel`, `outcome`
pub fn record_handshake(channel: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("rtms_handshakes_total", "channel" => channel, "outcome" => outcome).increment(1);
}

/// Metric: `rtms_keepalives_total`
/// Labels: `channel`
pub fn record_keepalive(channel: &'static str) {
    counter!("rtms_keepalives_total", "channel" => channel).increment(1);
}

/// Metric: `rtms_frames_received_total`
/// Labels: `kind`
pub fn record_frame(kind: &'static str) {
    counter!("rtms_frames_received_total", "kind" => kind).increment(1);
}

/// An inbound message was logged and dropped.
///
/// Metric: `rtms_messages_dropped_total`
/// Labels: `channel`, `reason`
pub fn record_message_dropped(channel: &'static str, reason: &'static str) {
    counter!("rtms_messages_dropped_total", "channel" => channel, "reason" => reason)
        .increment(1);
}

/// Metric: `rtms_channels_closed_total`
/// Labels: `channel`
pub fn record_channel_closed(channel: &'static str) {
    counter!("rtms_channels_closed_total", "channel" => channel).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without an installed recorder these calls go to the no-op recorder;
    // they only need to not panic.
    #[test]
    fn test_recording_without_recorder() {
        set_sessions_active(0);
        set_sessions_active(3);
        record_session_started();
        record_connect_failure("signaling");
        record_handshake("media", true);
        record_handshake("media", false);
        record_keepalive("signaling");
        record_frame("audio");
        record_message_dropped("media", "decode");
        record_channel_closed("media");
    }

    #[test]
    fn test_counters_carry_bounded_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_keepalive("media");
            record_keepalive("media");
            record_handshake("signaling", false);
        });

        let snapshot = snapshotter.snapshot().into_vec();

        let keepalives = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "rtms_keepalives_total")
            .expect("keepalive counter recorded");
        assert_eq!(keepalives.3, DebugValue::Counter(2));
        assert!(keepalives
            .0
            .key()
            .labels()
            .any(|label| label.key() == "channel" && label.value() == "media"));

        let handshakes = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "rtms_handshakes_total")
            .expect("handshake counter recorded");
        assert!(handshakes
            .0
            .key()
            .labels()
            .any(|label| label.key() == "outcome" && label.value() == "failure"));
    }
}
