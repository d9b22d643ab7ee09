//! Gain stage: manual dB gain, or RMS-driven automatic gain control.
//!
//! AGC and manual gain are mutually exclusive per chunk — when AGC is on,
//! its smoothed gain replaces the manual gain; turning AGC off resets the
//! adaptive gain to unity. Output is hard-clipped to [-1, 1]: clip, don't
//! wrap.

/// Exponential smoothing factor for the adaptive gain.
pub const AGC_SMOOTHING: f32 = 0.95;

/// Maximum adaptive boost (≈ +34 dB).
pub const AGC_MAX_GAIN: f32 = 50.0;

/// RMS at or below this floor skips the gain update for the chunk,
/// preventing divergence on near-silence.
pub const AGC_RMS_FLOOR: f32 = 0.001;

#[derive(Debug, Clone)]
pub struct GainStage {
    /// Linear gain derived from the manual dB setting.
    manual_gain: f32,
    auto_enabled: bool,
    /// AGC target RMS in [0.01, 0.9].
    auto_target: f32,
    /// Current adaptive gain, always within [1.0, AGC_MAX_GAIN].
    agc_gain: f32,
}

impl GainStage {
    pub fn new() -> Self {
        Self {
            manual_gain: 1.0,
            auto_enabled: false,
            auto_target: 0.1,
            agc_gain: 1.0,
        }
    }

    /// Set the manual gain in decibels: `linear = 10^(db/20)`.
    pub fn set_manual_gain_db(&mut self, db: f32) {
        self.manual_gain = 10f32.powf(db / 20.0);
    }

    /// Switch between AGC and manual gain. Disabling AGC resets the
    /// adaptive gain to unity.
    pub fn set_auto_gain_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.agc_gain = 1.0;
        }
        self.auto_enabled = enabled;
    }

    /// Set the AGC target RMS, clamped to [0.01, 0.9].
    pub fn set_auto_gain_target(&mut self, target: f32) {
        self.auto_target = target.clamp(0.01, 0.9);
    }

    /// Current adaptive gain (unity when AGC is off).
    pub fn current_auto_gain(&self) -> f32 {
        self.agc_gain
    }

    /// Scale one chunk and hard-clip each sample to [-1, 1].
    pub fn apply(&mut self, samples: &[f32]) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }

        let gain = if self.auto_enabled {
            let rms = rms(samples);
            if rms > AGC_RMS_FLOOR {
                let target_gain = (self.auto_target / rms).min(AGC_MAX_GAIN);
                let smoothed = AGC_SMOOTHING * self.agc_gain + (1.0 - AGC_SMOOTHING) * target_gain;
                self.agc_gain = smoothed.clamp(1.0, AGC_MAX_GAIN);
            }
            // Near-silence reuses the previous gain unchanged.
            self.agc_gain
        } else {
            self.manual_gain
        };

        samples
            .iter()
            .map(|&s| (s * gain).clamp(-1.0, 1.0))
            .collect()
    }
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new()
    }
}

/// True root-mean-square — distinct from the VAD's mean-abs trigger signal.
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
