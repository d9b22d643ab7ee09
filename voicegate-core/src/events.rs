//! Event types broadcast to downstream collaborators.
//!
//! | Event | Consumer |
//! |-------|----------|
//! | `SegmentEvent` | transcription collaborator (fire-and-forget) |
//! | `ActivityEvent` | level meter / UI monitoring |
//! | `EngineStatusEvent` | lifecycle observers |
//!
//! Segment hand-off is in-process: the samples travel as a cloned `Vec<f32>`
//! on a `tokio::sync::broadcast` channel, emitted in start-time order. The
//! monitoring events carry serde derives for UI transport.

use serde::{Deserialize, Serialize};

use crate::vad::Segment;

// ---------------------------------------------------------------------------
// Segment events
// ---------------------------------------------------------------------------

/// A finished speech segment offered to the transcription collaborator.
///
/// The sender never awaits a result; a busy or absent consumer is its own
/// concern and never stalls the conditioning pipeline.
#[derive(Debug, Clone)]
pub struct SegmentEvent {
    /// Monotonically increasing segment sequence number.
    pub seq: u64,
    pub segment: Segment,
}

// ---------------------------------------------------------------------------
// Activity events
// ---------------------------------------------------------------------------

/// Emitted for each processed chunk — level metering for UI feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Mean absolute level of the conditioned chunk in [0.0, 1.0].
    pub level: f32,
    /// Whether the segmentation engine is accumulating a segment.
    pub recording: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the conditioning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Pipeline thread live, conditioning audio.
    Running,
    /// Stopped; the engine may be restarted.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_event_serializes_with_camel_case_fields() {
        let event = ActivityEvent {
            seq: 3,
            level: 0.18,
            recording: true,
        };

        let json = serde_json::to_value(&event).expect("serialize activity event");
        assert_eq!(json["seq"], 3);
        let level = json["level"]
            .as_f64()
            .expect("level should serialize as number");
        assert!((level - 0.18).abs() < 1e-5);
        assert_eq!(json["recording"], true);

        let round_trip: ActivityEvent =
            serde_json::from_value(json).expect("deserialize activity event");
        assert_eq!(round_trip.seq, 3);
        assert!(round_trip.recording);
    }

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::Running,
            detail: None,
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "running");
        assert_eq!(json["detail"], serde_json::Value::Null);

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::Running);
    }

    #[test]
    fn flush_reason_serializes_lowercase() {
        use crate::vad::FlushReason;
        let json = serde_json::to_value(FlushReason::MaxDuration).expect("serialize reason");
        assert_eq!(json, "maxduration");
        assert!(serde_json::from_str::<FlushReason>(r#""MaxDuration""#).is_err());
    }
}
