//! Second-order IIR filter cell with Butterworth coefficient derivation.
//!
//! ## Algorithm
//!
//! Direct-Form-II-style recursion:
//! `y = a0*x + a1*x1 + a2*x2 - b1*y1 - b2*y2`, then shift the delay line.
//! Coefficients come from the standard biquad-cookbook highpass/lowpass
//! formulas at fixed Q = 1/√2 (maximally flat passband).

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Which side of the band a section removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Removes energy below the cutoff.
    Highpass,
    /// Removes energy above the cutoff.
    Lowpass,
}

/// One biquad section's coefficients. Stable until cutoff, kind or sample
/// rate changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coefficients {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b1: f64,
    pub b2: f64,
}

impl Coefficients {
    /// Derive 2nd-order Butterworth coefficients for `kind` at `cutoff_hz`.
    ///
    /// The target frequency is normalized to Nyquist and clamped to
    /// `[0.001, 0.999]` so the math stays well-conditioned at the band
    /// edges — a clamp, never an error.
    pub fn butterworth(kind: FilterKind, cutoff_hz: f64, sample_rate: u32) -> Self {
        let normalized = (cutoff_hz / (f64::from(sample_rate) * 0.5)).clamp(0.001, 0.999);
        let omega = PI * normalized;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        // Q = 1/sqrt(2) for a Butterworth response
        let alpha = sin_omega * FRAC_1_SQRT_2;
        let norm = 1.0 + alpha;

        match kind {
            FilterKind::Highpass => {
                let a0 = (1.0 + cos_omega) / (2.0 * norm);
                Self {
                    a0,
                    a1: -(1.0 + cos_omega) / norm,
                    a2: a0,
                    b1: -2.0 * cos_omega / norm,
                    b2: (1.0 - alpha) / norm,
                }
            }
            FilterKind::Lowpass => {
                let a0 = (1.0 - cos_omega) / (2.0 * norm);
                Self {
                    a0,
                    a1: (1.0 - cos_omega) / norm,
                    a2: a0,
                    b1: -2.0 * cos_omega / norm,
                    b2: (1.0 - alpha) / norm,
                }
            }
        }
    }
}

/// A single biquad filter cell: coefficients plus a four-value delay line.
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coeffs: Coefficients,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(coeffs: Coefficients) -> Self {
        Self {
            coeffs,
            ..Self::default()
        }
    }

    /// Swap in new coefficients. The delay line is left untouched — callers
    /// that change cutoff or sample rate must also call [`Biquad::reset`].
    pub fn set_coefficients(&mut self, coeffs: Coefficients) {
        self.coeffs = coeffs;
    }

    /// Filter one sample. O(1), no allocation.
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let c = &self.coeffs;
        let y = c.a0 * x + c.a1 * self.x1 + c.a2 * self.x2 - c.b1 * self.y1 - c.b2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Zero the delay line. Used on configuration change, not on every chunk.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / f64::from(sample_rate)).sin())
            .collect()
    }

    /// RMS of the second half of the filtered signal (skips the transient).
    fn settled_rms(filter: &mut Biquad, input: &[f64]) -> f64 {
        let out: Vec<f64> = input.iter().map(|&x| filter.process(x)).collect();
        let tail = &out[out.len() / 2..];
        (tail.iter().map(|y| y * y).sum::<f64>() / tail.len() as f64).sqrt()
    }

    #[test]
    fn highpass_attenuates_below_cutoff() {
        let coeffs = Coefficients::butterworth(FilterKind::Highpass, 300.0, 16_000);

        let mut f = Biquad::new(coeffs);
        let low = settled_rms(&mut f, &sine(30.0, 16_000, 16_000));
        f.reset();
        let high = settled_rms(&mut f, &sine(1_000.0, 16_000, 16_000));

        assert!(
            low < high * 0.1,
            "30 Hz should be strongly attenuated: low={low} high={high}"
        );
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let coeffs = Coefficients::butterworth(FilterKind::Lowpass, 3_400.0, 16_000);

        let mut f = Biquad::new(coeffs);
        let high = settled_rms(&mut f, &sine(7_000.0, 16_000, 16_000));
        f.reset();
        let mid = settled_rms(&mut f, &sine(1_000.0, 16_000, 16_000));

        assert!(
            high < mid * 0.5,
            "7 kHz should be attenuated: high={high} mid={mid}"
        );
    }

    #[test]
    fn cutoff_is_clamped_to_nyquist_range() {
        // A cutoff far above Nyquist must not blow up the coefficients.
        let coeffs = Coefficients::butterworth(FilterKind::Lowpass, 100_000.0, 16_000);
        let mut f = Biquad::new(coeffs);
        let out = f.process(1.0);
        assert!(out.is_finite());
    }

    #[test]
    fn reset_clears_delay_line() {
        let coeffs = Coefficients::butterworth(FilterKind::Highpass, 300.0, 16_000);
        let mut a = Biquad::new(coeffs);
        let mut b = Biquad::new(coeffs);

        for x in [0.5, -0.25, 0.75] {
            a.process(x);
        }
        a.reset();

        // After a reset, both filters must produce identical output.
        for x in [0.1, 0.2, 0.3] {
            assert_eq!(a.process(x), b.process(x));
        }
    }
}
