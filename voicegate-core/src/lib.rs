//! # voicegate-core
//!
//! Audio conditioning and voice-activity segmentation pipeline.
//!
//! ## Architecture
//!
//! ```text
//! Capture collaborator → SPSC RingBuffer → Pipeline (dedicated thread)
//!                                               │
//!                                   Bandpass → Gain/AGC → Level tap
//!                                               │
//!                                      SegmentationEngine (VAD)
//!                                               │
//!                                 broadcast::Sender<SegmentEvent>
//! ```
//!
//! The capture side only touches the wait-free producer half of the ring.
//! All heap work and mutable DSP state lives on the pipeline thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod vad;

// Convenience re-exports for downstream crates
pub use config::PipelineConfig;
pub use engine::VoicegateEngine;
pub use error::VoicegateError;
pub use events::{ActivityEvent, EngineStatus, EngineStatusEvent, SegmentEvent};
pub use vad::{FlushReason, Segment, SegmentationConfig, SegmentationEngine};
