//! Blocking conditioning loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Apply any queued PipelineConfig (chunk boundary only)
//! 2. Drain ring buffer → one chunk of raw i16 PCM
//! 3. Decode to normalized f32 samples
//! 4. BandpassStage → GainStage
//! 5. Level meter tap → ActivityEvent broadcast
//! 6. SegmentationEngine → SegmentEvent broadcast on flush
//! ```
//!
//! The whole loop runs on one dedicated thread; every piece of filter, gain
//! and VAD state is owned exclusively by that thread. On exit the loop
//! performs a forced flush so stop never orphans buffered speech.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    buffering::{chunk::AudioChunk, Consumer, PcmConsumer},
    config::PipelineConfig,
    dsp::{bandpass::BandpassStage, gain::GainStage, level},
    events::{ActivityEvent, SegmentEvent},
    vad::{Segment, SegmentationEngine},
};

pub struct PipelineDiagnostics {
    pub chunks_in: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub speech_chunks: AtomicUsize,
    pub segments_emitted: AtomicUsize,
    pub config_updates: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            chunks_in: AtomicUsize::new(0),
            samples_in: AtomicUsize::new(0),
            speech_chunks: AtomicUsize::new(0),
            segments_emitted: AtomicUsize::new(0),
            config_updates: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_in.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.speech_chunks.store(0, Ordering::Relaxed);
        self.segments_emitted.store(0, Ordering::Relaxed);
        self.config_updates.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            speech_chunks: self.speech_chunks.load(Ordering::Relaxed),
            segments_emitted: self.segments_emitted.load(Ordering::Relaxed),
            config_updates: self.config_updates.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub samples_in: usize,
    pub speech_chunks: usize,
    pub segments_emitted: usize,
    pub config_updates: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub consumer: PcmConsumer,
    pub running: Arc<AtomicBool>,
    pub config_rx: Receiver<PipelineConfig>,
    pub segment_tx: broadcast::Sender<SegmentEvent>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// PCM samples drained from the ring per iteration: 200 ms at 16 kHz.
const DRAIN_CHUNK: usize = 3_200;

/// Minimum sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Level telemetry cadence, in activity events.
const LEVEL_LOG_EVERY: u64 = 50;

/// Run the blocking pipeline until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!("conditioning pipeline started");
    let started = Instant::now();

    let mut bandpass = BandpassStage::new(
        ctx.config.sample_rate,
        ctx.config.low_cut_hz,
        ctx.config.high_cut_hz,
    );
    bandpass.set_enabled(ctx.config.use_bandpass);

    let mut gain = GainStage::new();
    gain.set_manual_gain_db(ctx.config.gain_boost_db);
    gain.set_auto_gain_target(ctx.config.auto_gain_target);
    gain.set_auto_gain_enabled(ctx.config.auto_gain_enabled);

    let mut segmenter = SegmentationEngine::new(ctx.config.segmentation());

    // Scratch buffer, reused each iteration.
    let mut raw = vec![0i16; DRAIN_CHUNK];
    let mut activity_seq = 0u64;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── Configuration updates land between chunks only ────────────────
        while let Ok(update) = ctx.config_rx.try_recv() {
            apply_config(
                &mut ctx.config,
                update,
                &mut bandpass,
                &mut gain,
                &mut segmenter,
            );
            ctx.diagnostics.config_updates.fetch_add(1, Ordering::Relaxed);
        }

        // ── Drain ring buffer ─────────────────────────────────────────────
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            // Nothing to process — yield to avoid burning 100 % CPU
            std::thread::sleep(Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }

        ctx.diagnostics.chunks_in.fetch_add(1, Ordering::Relaxed);
        ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);

        // ── Decode + condition ────────────────────────────────────────────
        let chunk = AudioChunk::from_pcm16(&raw[..n], ctx.config.sample_rate);
        let filtered = bandpass.process(&chunk.samples);
        let shaped = gain.apply(&filtered);

        // ── Level tap + segmentation ──────────────────────────────────────
        let chunk_level = level::chunk_level(&shaped);
        let now_ms = started.elapsed().as_millis() as u64;
        let segment = segmenter.push_chunk(&shaped, now_ms);

        if segmenter.is_recording() || segment.is_some() {
            ctx.diagnostics.speech_chunks.fetch_add(1, Ordering::Relaxed);
        }

        let _ = ctx.activity_tx.send(ActivityEvent {
            seq: activity_seq,
            level: chunk_level,
            recording: segmenter.is_recording(),
        });
        activity_seq = activity_seq.wrapping_add(1);

        if activity_seq % LEVEL_LOG_EVERY == 0 {
            debug!(
                level = format_args!("{:.4}", chunk_level),
                recording = segmenter.is_recording(),
                buffered = segmenter.buffered_samples(),
                "audio level check"
            );
        }

        if let Some(segment) = segment {
            emit_segment(&mut ctx, segment);
        }
    }

    // Forced flush: stopping must not orphan buffered speech, and it runs
    // on this thread so it completes before teardown.
    let now_ms = started.elapsed().as_millis() as u64;
    if let Some(segment) = segmenter.flush(now_ms) {
        info!(
            samples = segment.samples.len(),
            "stop requested with buffered audio — forcing flush"
        );
        emit_segment(&mut ctx, segment);
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        chunks_in = snap.chunks_in,
        samples_in = snap.samples_in,
        speech_chunks = snap.speech_chunks,
        segments_emitted = snap.segments_emitted,
        config_updates = snap.config_updates,
        "pipeline stopped — diagnostics"
    );
}

fn apply_config(
    current: &mut PipelineConfig,
    update: PipelineConfig,
    bandpass: &mut BandpassStage,
    gain: &mut GainStage,
    segmenter: &mut SegmentationEngine,
) {
    if update.sample_rate != current.sample_rate {
        info!(
            from = current.sample_rate,
            to = update.sample_rate,
            "sample rate changed — resetting filter state"
        );
        bandpass.set_sample_rate(update.sample_rate);
    }
    if update.low_cut_hz != current.low_cut_hz || update.high_cut_hz != current.high_cut_hz {
        bandpass.configure(update.low_cut_hz, update.high_cut_hz);
    }
    bandpass.set_enabled(update.use_bandpass);

    gain.set_manual_gain_db(update.gain_boost_db);
    gain.set_auto_gain_target(update.auto_gain_target);
    gain.set_auto_gain_enabled(update.auto_gain_enabled);

    segmenter.reconfigure(update.segmentation());

    debug!("configuration applied at chunk boundary");
    *current = update;
}

fn emit_segment(ctx: &mut PipelineContext, segment: Segment) {
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    ctx.diagnostics
        .segments_emitted
        .fetch_add(1, Ordering::Relaxed);
    info!(
        seq,
        samples = segment.samples.len(),
        reason = ?segment.reason,
        "segment emitted"
    );
    // Fire-and-forget: delivery failure is the collaborator's concern.
    let _ = ctx.segment_tx.send(SegmentEvent { seq, segment });
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::buffering::{create_pcm_ring, Producer};
    use crate::vad::FlushReason;

    fn recv_segment_with_timeout(
        rx: &mut broadcast::Receiver<SegmentEvent>,
        timeout: Duration,
    ) -> SegmentEvent {
        let start = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(ev) => return ev,
                Err(TryRecvError::Empty) => {
                    if start.elapsed() >= timeout {
                        panic!("timed out waiting for segment event");
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("segment channel closed unexpectedly"),
            }
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            // Keep VAD timings short so tests stay fast.
            min_speech_secs: 0.0,
            max_speech_secs: 10.0,
            silence_secs: 10.0,
            pickup_threshold: 120,
            ..PipelineConfig::default()
        }
    }

    fn make_ctx(
        config: PipelineConfig,
        consumer: PcmConsumer,
        running: Arc<AtomicBool>,
        config_rx: Receiver<PipelineConfig>,
        segment_tx: broadcast::Sender<SegmentEvent>,
    ) -> PipelineContext {
        let (activity_tx, _) = broadcast::channel(64);
        PipelineContext {
            config,
            consumer,
            running,
            config_rx,
            segment_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        }
    }

    /// 1 kHz tone at 0.3 amplitude — inside the default passband, loud
    /// enough to trip the pickup threshold after filtering.
    fn tone_pcm(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                (0.3 * (2.0 * std::f32::consts::PI * 1_000.0 * t).sin() * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[test]
    fn stop_forces_flush_of_buffered_speech() {
        let (mut producer, consumer) = create_pcm_ring();
        // One second of in-band tone (well above the 0.012 amplitude threshold).
        producer.push_slice(&tone_pcm(16_000));

        let running = Arc::new(AtomicBool::new(true));
        let (_config_tx, config_rx) = crossbeam_channel::bounded(4);
        let (segment_tx, mut segment_rx) = broadcast::channel(16);

        let ctx = make_ctx(
            test_config(),
            consumer,
            Arc::clone(&running),
            config_rx,
            segment_tx,
        );

        let handle = thread::spawn(move || run(ctx));
        thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
        handle.join().expect("pipeline thread panicked");

        let event = recv_segment_with_timeout(&mut segment_rx, Duration::from_secs(1));
        assert_eq!(event.segment.reason, FlushReason::Stopped);
        assert_eq!(event.segment.samples.len(), 16_000);
    }

    #[test]
    fn stop_without_audio_emits_nothing() {
        let (_producer, consumer) = create_pcm_ring();

        let running = Arc::new(AtomicBool::new(true));
        let (_config_tx, config_rx) = crossbeam_channel::bounded(4);
        let (segment_tx, mut segment_rx) = broadcast::channel(16);

        let ctx = make_ctx(
            test_config(),
            consumer,
            Arc::clone(&running),
            config_rx,
            segment_tx,
        );

        let handle = thread::spawn(move || run(ctx));
        thread::sleep(Duration::from_millis(30));
        running.store(false, Ordering::SeqCst);
        handle.join().expect("pipeline thread panicked");

        assert!(matches!(
            segment_rx.try_recv(),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed)
        ));
    }

    #[test]
    fn activity_events_report_level_and_recording() {
        let (mut producer, consumer) = create_pcm_ring();
        // A DC block would be stripped by the highpass; the tone survives
        // the bandpass and must both meter and trigger.
        producer.push_slice(&tone_pcm(DRAIN_CHUNK));

        let running = Arc::new(AtomicBool::new(true));
        let (_config_tx, config_rx) = crossbeam_channel::bounded(4);
        let (segment_tx, _segment_rx) = broadcast::channel(16);
        let (activity_tx, mut activity_rx) = broadcast::channel(64);

        let mut ctx = make_ctx(
            test_config(),
            consumer,
            Arc::clone(&running),
            config_rx,
            segment_tx,
        );
        ctx.activity_tx = activity_tx;

        let handle = thread::spawn(move || run(ctx));

        let start = Instant::now();
        let event = loop {
            match activity_rx.try_recv() {
                Ok(ev) => break ev,
                Err(TryRecvError::Empty) => {
                    assert!(
                        start.elapsed() < Duration::from_secs(1),
                        "timed out waiting for activity event"
                    );
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("activity channel closed"),
            }
        };

        running.store(false, Ordering::SeqCst);
        handle.join().expect("pipeline thread panicked");

        assert!(
            event.level > 0.1,
            "in-band tone should meter: {}",
            event.level
        );
        assert!(event.recording, "in-band tone should trigger recording");
    }

    #[test]
    fn config_updates_apply_between_chunks() {
        let (_producer, consumer) = create_pcm_ring();

        let running = Arc::new(AtomicBool::new(true));
        let (config_tx, config_rx) = crossbeam_channel::bounded(4);
        let (segment_tx, _segment_rx) = broadcast::channel(16);

        let ctx = make_ctx(
            test_config(),
            consumer,
            Arc::clone(&running),
            config_rx,
            segment_tx,
        );
        let diagnostics = Arc::clone(&ctx.diagnostics);

        let mut update = test_config();
        update.use_bandpass = false;
        update.sample_rate = 48_000;
        config_tx.send(update).expect("queue config");

        let handle = thread::spawn(move || run(ctx));
        thread::sleep(Duration::from_millis(40));
        running.store(false, Ordering::SeqCst);
        handle.join().expect("pipeline thread panicked");

        assert_eq!(diagnostics.snapshot().config_updates, 1);
    }
}
