//! Audio conditioning DSP stages.
//!
//! The per-chunk path is `bandpass` → `gain`, with `level` tapped in parallel
//! for monitoring. All stages are no-ops on empty input and saturate instead
//! of erroring on out-of-range values.

pub mod bandpass;
pub mod biquad;
pub mod gain;
pub mod level;
