//! Externally supplied pipeline configuration.
//!
//! The pipeline never reaches into shared global state: a `PipelineConfig`
//! arrives as one immutable unit and is applied atomically at a chunk
//! boundary. Durations are in UI-friendly seconds and the pickup threshold
//! on the UI integer scale; conversion to the internal ms/amplitude scales
//! happens here, once, at configuration time.

use serde::{Deserialize, Serialize};

use crate::vad::SegmentationConfig;

/// Trailing pre-roll window retained while the VAD is idle.
const IDLE_WINDOW_MS: u64 = 2_000;

/// The full configuration surface consumed from an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Enable the bandpass stage (pass-through when false).
    pub use_bandpass: bool,
    /// Highpass edge in Hz. Invalid combinations degrade to pass-through.
    pub low_cut_hz: f64,
    /// Lowpass edge in Hz.
    pub high_cut_hz: f64,
    /// Manual gain in dB.
    pub gain_boost_db: f32,
    /// Switch to AGC-controlled gain.
    pub auto_gain_enabled: bool,
    /// AGC target RMS in [0.01, 0.9].
    pub auto_gain_target: f32,
    /// VAD trigger on the UI scale (e.g. 50–500); converted to amplitude.
    pub pickup_threshold: u32,
    /// Minimum speech duration in seconds.
    pub min_speech_secs: f32,
    /// Maximum speech duration in seconds.
    pub max_speech_secs: f32,
    /// Silence-to-stop duration in seconds.
    pub silence_secs: f32,
    /// Must match the capture collaborator's actual rate. Changing it
    /// resets filter state.
    pub sample_rate: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_bandpass: true,
            // Speech band: remove low-frequency rumble and high-frequency hiss.
            low_cut_hz: 300.0,
            high_cut_hz: 3_400.0,
            gain_boost_db: 0.0,
            auto_gain_enabled: false,
            auto_gain_target: 0.1,
            pickup_threshold: 120,
            min_speech_secs: 1.0,
            max_speech_secs: 30.0,
            silence_secs: 1.0,
            sample_rate: 16_000,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the pipeline cannot run with. Filter cutoffs
    /// are not checked here; an invalid band degrades to pass-through.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sampleRate must be positive".into());
        }
        if self.max_speech_secs <= 0.0 {
            return Err("maxSpeechSecs must be positive".into());
        }
        if self.min_speech_secs > self.max_speech_secs {
            return Err("minSpeechSecs must not exceed maxSpeechSecs".into());
        }
        Ok(())
    }

    /// Derive the segmentation parameters on their internal scales.
    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig {
            pickup_threshold: SegmentationConfig::pickup_threshold_from_ui(self.pickup_threshold),
            min_speech_ms: secs_to_ms(self.min_speech_secs),
            max_speech_ms: secs_to_ms(self.max_speech_secs),
            silence_ms: secs_to_ms(self.silence_secs),
            sample_rate: self.sample_rate,
            idle_window_ms: IDLE_WINDOW_MS,
        }
    }
}

fn secs_to_ms(secs: f32) -> u64 {
    (f64::from(secs.max(0.0)) * 1_000.0).round() as u64
}
