//! Destination for media frames.
//!
//! The media channel only classifies frames; whatever decodes, stores or
//! forwards them lives behind [`FrameSink`].

use crate::protocol::MediaFrame;
use tracing::debug;

/// Receives every media frame of every session, in arrival order per
/// channel.
///
/// Called inline from the media read loop, so implementations must not
/// block. Hand heavy work off to a task or queue.
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame(&self, meeting_id: &str, frame: MediaFrame);
}

/// Default sink: logs each frame at debug level and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFrameSink;

impl FrameSink for LoggingFrameSink {
    fn on_frame(&self, meeting_id: &str, frame: MediaFrame) {
        debug!(
            target: "rtms.channel.media",
            meeting_id = %meeting_id,
            kind = frame.kind.as_str(),
            data_len = frame.data_len(),
            "Media frame received"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameKind;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_logging_sink_accepts_frames() {
        let sink: Arc<dyn FrameSink> = Arc::new(LoggingFrameSink);
        sink.on_frame(
            "m1",
            MediaFrame {
                kind: FrameKind::Transcript,
                payload: json!({"msg_type": 17, "content": {"data": "hello"}}),
            },
        );
    }
}
