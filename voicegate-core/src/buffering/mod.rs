//! Lock-free SPSC ring buffer for raw PCM samples.
//!
//! The capture collaborator (microphone / system-audio backend, out of this
//! crate's scope) holds the producer half and writes interleaved mono i16
//! frames from its callback; `push_slice` is wait-free and allocation-free.
//! The pipeline thread holds the consumer half.

pub mod chunk;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half — held by the capture collaborator.
pub type PcmProducer = ringbuf::HeapProd<i16>;

/// Type alias for the consumer half — held by the pipeline thread.
pub type PcmConsumer = ringbuf::HeapCons<i16>;

/// Buffer capacity: 2^21 = 2 097 152 i16 samples ≈ 131 s at 16 kHz.
/// Capture free-runs with no flow control, so the ring must absorb long
/// stretches where the consumer is momentarily behind.
pub const RING_CAPACITY: usize = 1 << 21;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
///
/// # Panics
/// Never panics — `HeapRb` construction cannot fail for reasonable capacities.
pub fn create_pcm_ring() -> (PcmProducer, PcmConsumer) {
    HeapRb::<i16>::new(RING_CAPACITY).split()
}
