//! Typed audio chunk passed from the ring buffer through the DSP stages.

/// A contiguous block of mono f32 samples in [-1.0, 1.0] at a known sample rate.
///
/// Allocated once per pipeline iteration (on the non-RT pipeline thread).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode signed 16-bit PCM into normalized f32 samples.
    pub fn from_pcm16(pcm: &[i16], sample_rate: u32) -> Self {
        let samples = pcm.iter().map(|&s| f32::from(s) / 32768.0).collect();
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_decode_normalizes_to_unit_range() {
        let chunk = AudioChunk::from_pcm16(&[0, 16384, -16384, i16::MAX, i16::MIN], 16_000);
        assert_eq!(chunk.samples[0], 0.0);
        assert!((chunk.samples[1] - 0.5).abs() < 1e-6);
        assert!((chunk.samples[2] + 0.5).abs() < 1e-6);
        assert!(chunk.samples[3] < 1.0);
        assert_eq!(chunk.samples[4], -1.0);
    }

    #[test]
    fn duration_reflects_sample_rate() {
        let chunk = AudioChunk::new(vec![0.0; 3_200], 16_000);
        assert!((chunk.duration_secs() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn empty_pcm_is_empty_chunk() {
        let chunk = AudioChunk::from_pcm16(&[], 16_000);
        assert!(chunk.is_empty());
        assert_eq!(chunk.duration_secs(), 0.0);
    }
}
