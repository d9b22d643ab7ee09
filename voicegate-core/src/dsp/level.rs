//! Instantaneous level metering for UI feedback.
//!
//! Stateless — display decay and rolling history are the consumer's concern.

/// Mean absolute amplitude of a chunk, normalized to [0, 1].
pub fn chunk_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s.abs()).sum();
    (sum / samples.len() as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_chunk_is_zero() {
        assert_eq!(chunk_level(&[]), 0.0);
    }

    #[test]
    fn full_scale_is_one() {
        assert_eq!(chunk_level(&[1.0, -1.0, 1.0, -1.0]), 1.0);
    }

    #[test]
    fn mean_of_mixed_signs() {
        assert_relative_eq!(chunk_level(&[0.5, -0.25, 0.0, 0.25]), 0.25);
    }

    #[test]
    fn clamped_even_for_out_of_range_input() {
        // Upstream clipping should prevent this, but the meter saturates anyway.
        assert_eq!(chunk_level(&[4.0, -4.0]), 1.0);
    }
}
