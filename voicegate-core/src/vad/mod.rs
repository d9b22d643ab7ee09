//! Voice-activity segmentation state machine.
//!
//! ## Algorithm
//!
//! 1. Every chunk is appended to the sample buffer.
//! 2. The chunk's mean absolute amplitude is compared against the pickup
//!    threshold (a cheaper trigger than the gain stage's true RMS — the
//!    asymmetry is deliberate).
//! 3. Idle + sound → Recording begins; the buffered idle pre-roll is
//!    promoted into the new segment.
//! 4. Recording absorbs every chunk, loud or not; a loud chunk refreshes
//!    the last-sound time.
//! 5. A segment flushes when max duration is reached, or when silence has
//!    lasted long enough after the minimum speech duration. A forced flush
//!    emits whatever is buffered and is a no-op when the buffer is empty.
//! 6. While Idle the buffer is trimmed to a fixed trailing window so memory
//!    stays bounded without losing onset pre-roll.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Timing and threshold parameters for segmentation.
///
/// Immutable during a session except via [`SegmentationEngine::reconfigure`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationConfig {
    /// Amplitude threshold (mean-abs scale) above which a chunk counts as sound.
    pub pickup_threshold: f32,
    /// A segment may not flush on silence before this much speech time.
    pub min_speech_ms: u64,
    /// A segment flushes unconditionally after this much speech time.
    pub max_speech_ms: u64,
    /// Sustained silence of this length (after the minimum) ends a segment.
    pub silence_ms: u64,
    /// Sample rate of the conditioned stream (Hz).
    pub sample_rate: u32,
    /// Trailing window retained while Idle (onset pre-roll).
    pub idle_window_ms: u64,
}

impl SegmentationConfig {
    /// Convert the UI-scale pickup threshold (e.g. 50–500) to the amplitude
    /// scale used by the trigger test (e.g. 120 → 0.012).
    pub fn pickup_threshold_from_ui(ui_value: u32) -> f32 {
        ui_value as f32 / 10_000.0
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            pickup_threshold: 0.012,
            min_speech_ms: 1_000,
            max_speech_ms: 30_000,
            silence_ms: 1_000,
            sample_rate: 16_000,
            idle_window_ms: 2_000,
        }
    }
}

/// Why a segment was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushReason {
    /// Max speech duration reached while still recording.
    MaxDuration,
    /// Silence lasted long enough after the minimum speech duration.
    Silence,
    /// Forced flush — external stop signal.
    Stopped,
}

/// One contiguous span of buffered audio judged to contain speech,
/// delivered as a unit to the transcription collaborator.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Normalized f32 samples at the pipeline's fixed sample rate.
    pub samples: Vec<f32>,
    /// When the threshold crossing started this segment (pipeline clock, ms).
    pub started_at_ms: u64,
    /// When the segment was flushed (pipeline clock, ms).
    pub emitted_at_ms: u64,
    pub reason: FlushReason,
}

impl Segment {
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / f64::from(sample_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VadState {
    Idle,
    Recording {
        started_at_ms: u64,
        last_sound_ms: u64,
    },
}

/// The VAD state machine. Owned exclusively by the pipeline thread.
#[derive(Debug)]
pub struct SegmentationEngine {
    config: SegmentationConfig,
    state: VadState,
    buffer: Vec<f32>,
}

impl SegmentationEngine {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            state: VadState::Idle,
            buffer: Vec::new(),
        }
    }

    /// Swap in new parameters. Takes effect from the next chunk; an active
    /// segment keeps its start/last-sound times.
    pub fn reconfigure(&mut self, config: SegmentationConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, VadState::Recording { .. })
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one conditioned chunk at pipeline time `now_ms`.
    ///
    /// Returns a finished segment when a stop condition fires on this chunk.
    pub fn push_chunk(&mut self, samples: &[f32], now_ms: u64) -> Option<Segment> {
        if samples.is_empty() {
            return None;
        }

        self.buffer.extend_from_slice(samples);

        let amplitude = mean_abs(samples);
        let has_sound = amplitude > self.config.pickup_threshold;

        match self.state {
            VadState::Idle => {
                if has_sound {
                    info!(
                        amplitude,
                        threshold = self.config.pickup_threshold,
                        preroll_samples = self.buffer.len() - samples.len(),
                        "speech detected — recording started"
                    );
                    self.state = VadState::Recording {
                        started_at_ms: now_ms,
                        last_sound_ms: now_ms,
                    };
                } else {
                    self.trim_idle_buffer();
                }
                None
            }
            VadState::Recording {
                started_at_ms,
                last_sound_ms,
            } => {
                let last_sound_ms = if has_sound { now_ms } else { last_sound_ms };
                self.state = VadState::Recording {
                    started_at_ms,
                    last_sound_ms,
                };

                let speech_ms = now_ms.saturating_sub(started_at_ms);
                let silence_ms = now_ms.saturating_sub(last_sound_ms);

                if speech_ms >= self.config.max_speech_ms {
                    debug!(speech_ms, "stopping segment: max duration reached");
                    return Some(self.take_segment(started_at_ms, now_ms, FlushReason::MaxDuration));
                }

                if silence_ms >= self.config.silence_ms && speech_ms >= self.config.min_speech_ms {
                    debug!(
                        silence_ms,
                        speech_ms, "stopping segment: silence after min duration"
                    );
                    return Some(self.take_segment(started_at_ms, now_ms, FlushReason::Silence));
                }

                None
            }
        }
    }

    /// Forced flush: emit whatever is buffered regardless of duration or
    /// silence constraints. Idempotent — an empty buffer is a no-op.
    pub fn flush(&mut self, now_ms: u64) -> Option<Segment> {
        if self.buffer.is_empty() {
            self.state = VadState::Idle;
            return None;
        }

        let started_at_ms = match self.state {
            VadState::Recording { started_at_ms, .. } => started_at_ms,
            // Trailing idle audio: approximate the start from the buffer length.
            VadState::Idle => now_ms.saturating_sub(self.buffered_ms()),
        };

        info!(
            samples = self.buffer.len(),
            recording = self.is_recording(),
            "forced flush of buffered audio"
        );
        Some(self.take_segment(started_at_ms, now_ms, FlushReason::Stopped))
    }

    fn take_segment(&mut self, started_at_ms: u64, now_ms: u64, reason: FlushReason) -> Segment {
        let samples = std::mem::take(&mut self.buffer);
        self.state = VadState::Idle;
        Segment {
            samples,
            started_at_ms,
            emitted_at_ms: now_ms,
            reason,
        }
    }

    fn buffered_ms(&self) -> u64 {
        if self.config.sample_rate == 0 {
            return 0;
        }
        (self.buffer.len() as u64 * 1_000) / u64::from(self.config.sample_rate)
    }

    /// Bound the Idle buffer to the configured trailing window.
    fn trim_idle_buffer(&mut self) {
        let max_len =
            (u64::from(self.config.sample_rate) * self.config.idle_window_ms / 1_000) as usize;
        if self.buffer.len() > max_len {
            let drop = self.buffer.len() - max_len;
            self.buffer.drain(..drop);
        }
    }
}

/// Mean absolute amplitude — same formula as the level meter, but computed
/// here independently as the trigger signal.
fn mean_abs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}
