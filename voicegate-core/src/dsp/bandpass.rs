//! Band-limiting stage: highpass then lowpass Butterworth sections in series.
//!
//! Degrades to a bit-for-bit pass-through when disabled or when the cutoff
//! pair is invalid (non-positive, or low ≥ high). An invalid range is logged
//! once at configure time — never an error.

use tracing::{debug, warn};

use super::biquad::{Biquad, Coefficients, FilterKind};

/// Two-section bandpass over normalized f32 samples. Internal math is f64.
#[derive(Debug)]
pub struct BandpassStage {
    sample_rate: u32,
    enabled: bool,
    low_cut_hz: f64,
    high_cut_hz: f64,
    /// False when the configured cutoff pair degrades to pass-through.
    valid_range: bool,
    /// False when `high_cut_hz` ≥ Nyquist (nothing to remove below it).
    lowpass_active: bool,
    highpass: Biquad,
    lowpass: Biquad,
}

impl BandpassStage {
    pub fn new(sample_rate: u32, low_cut_hz: f64, high_cut_hz: f64) -> Self {
        let mut stage = Self {
            sample_rate,
            enabled: true,
            low_cut_hz,
            high_cut_hz,
            valid_range: false,
            lowpass_active: false,
            highpass: Biquad::default(),
            lowpass: Biquad::default(),
        };
        stage.configure(low_cut_hz, high_cut_hz);
        stage
    }

    /// Enable or disable the stage. Disabled means pass-through.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Recompute both coefficient sets for a new cutoff pair.
    ///
    /// The delay lines are reset: history computed under old coefficients
    /// must not be combined with new ones. Invalid pairs degrade to
    /// pass-through.
    pub fn configure(&mut self, low_cut_hz: f64, high_cut_hz: f64) {
        self.low_cut_hz = low_cut_hz;
        self.high_cut_hz = high_cut_hz;

        if low_cut_hz <= 0.0 || high_cut_hz <= 0.0 || low_cut_hz >= high_cut_hz {
            warn!(
                low_cut_hz,
                high_cut_hz, "invalid filter frequencies — bandpass degrades to pass-through"
            );
            self.valid_range = false;
            return;
        }

        self.valid_range = true;
        self.lowpass_active = high_cut_hz < f64::from(self.sample_rate) * 0.5;

        self.highpass.set_coefficients(Coefficients::butterworth(
            FilterKind::Highpass,
            low_cut_hz,
            self.sample_rate,
        ));
        self.lowpass.set_coefficients(Coefficients::butterworth(
            FilterKind::Lowpass,
            high_cut_hz,
            self.sample_rate,
        ));
        self.highpass.reset();
        self.lowpass.reset();

        debug!(
            low_cut_hz,
            high_cut_hz,
            lowpass_active = self.lowpass_active,
            "bandpass configured"
        );
    }

    /// Change the sample rate. Coefficients are recomputed and the delay
    /// lines reset — history recorded at the old rate is meaningless.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == 0 || sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.configure(self.low_cut_hz, self.high_cut_hz);
    }

    /// True when processing will actually filter (enabled and valid range).
    pub fn is_active(&self) -> bool {
        self.enabled && self.valid_range
    }

    /// Filter one chunk: a highpass pass over the whole chunk, then a
    /// lowpass pass (skipped when the high cutoff sits at or above Nyquist).
    ///
    /// Pass-through returns the input unchanged, bit for bit.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if !self.is_active() || samples.is_empty() {
            return samples.to_vec();
        }

        let mut work: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();

        for v in work.iter_mut() {
            *v = self.highpass.process(*v);
        }

        if self.lowpass_active {
            for v in work.iter_mut() {
                *v = self.lowpass.process(*v);
            }
        }

        work.into_iter().map(|v| v as f32).collect()
    }

    /// Zero both delay lines without touching coefficients.
    pub fn reset(&mut self) {
        self.highpass.reset();
        self.lowpass.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    fn settled_rms(samples: &[f32]) -> f32 {
        let tail = &samples[samples.len() / 2..];
        (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt()
    }

    #[test]
    fn disabled_stage_is_bit_for_bit_passthrough() {
        let mut stage = BandpassStage::new(16_000, 300.0, 3_400.0);
        stage.set_enabled(false);
        let input = sine(440.0, 16_000, 1_600);
        assert_eq!(stage.process(&input), input);
    }

    #[test]
    fn invalid_range_degrades_to_passthrough() {
        let mut stage = BandpassStage::new(16_000, 3_400.0, 300.0);
        assert!(!stage.is_active());
        let input = sine(440.0, 16_000, 1_600);
        assert_eq!(stage.process(&input), input);

        // Non-positive edges degrade too.
        stage.configure(-1.0, 3_400.0);
        assert!(!stage.is_active());
        stage.configure(300.0, 0.0);
        assert!(!stage.is_active());

        // A later valid pair recovers.
        stage.configure(300.0, 3_400.0);
        assert!(stage.is_active());
    }

    #[test]
    fn band_edges_are_rejected_relative_to_center() {
        let mut stage = BandpassStage::new(16_000, 300.0, 3_400.0);

        let center = settled_rms(&stage.process(&sine(1_000.0, 16_000, 16_000)));
        stage.reset();
        let below = settled_rms(&stage.process(&sine(30.0, 16_000, 16_000)));
        stage.reset();
        let above = settled_rms(&stage.process(&sine(6_800.0, 16_000, 16_000)));

        assert!(
            below < center * 0.5,
            "0.1*low_cut should be attenuated: below={below} center={center}"
        );
        assert!(
            above < center * 0.5,
            "2*high_cut should be attenuated: above={above} center={center}"
        );
    }

    #[test]
    fn lowpass_skipped_when_high_cut_at_nyquist() {
        let mut stage = BandpassStage::new(16_000, 300.0, 8_000.0);
        assert!(stage.is_active());
        // Only the highpass applies, so a mid-band tone passes essentially intact.
        let input = sine(1_000.0, 16_000, 16_000);
        let out = stage.process(&input);
        let ratio = settled_rms(&out) / settled_rms(&input);
        assert!(
            (0.8..=1.2).contains(&ratio),
            "mid-band tone should pass: ratio={ratio}"
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let mut stage = BandpassStage::new(16_000, 300.0, 3_400.0);
        assert!(stage.process(&[]).is_empty());
    }

    #[test]
    fn sample_rate_change_keeps_filtering_valid() {
        let mut stage = BandpassStage::new(16_000, 300.0, 3_400.0);
        stage.process(&sine(1_000.0, 16_000, 1_600));
        stage.set_sample_rate(48_000);
        assert!(stage.is_active());
        let out = stage.process(&sine(1_000.0, 48_000, 4_800));
        assert!(out.iter().all(|s| s.is_finite()));
    }
}
