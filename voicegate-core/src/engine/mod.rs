//! Engine facade: lifecycle, configuration hand-off, event subscriptions.
//!
//! `VoicegateEngine` owns the shared halves of the pipeline — the running
//! flag, the broadcast senders, the config queue — while all mutable DSP and
//! VAD state lives exclusively on the pipeline thread. `start()` hands the
//! ring-buffer producer to the capture collaborator; `stop()` joins the
//! thread, which guarantees the forced flush has completed (and its segment
//! has been broadcast) before `stop()` returns.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    buffering::{create_pcm_ring, PcmProducer},
    config::PipelineConfig,
    error::{Result, VoicegateError},
    events::{ActivityEvent, EngineStatus, EngineStatusEvent, SegmentEvent},
};

use self::pipeline::{DiagnosticsSnapshot, PipelineContext, PipelineDiagnostics};

/// Broadcast channel depth. A slow subscriber lags rather than blocking
/// the pipeline thread.
const BROADCAST_CAP: usize = 256;

/// Pending configuration updates; the pipeline drains the queue at every
/// chunk boundary, so it never fills in practice.
const CONFIG_QUEUE_CAP: usize = 16;

pub struct VoicegateEngine {
    config: Mutex<PipelineConfig>,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    segment_tx: broadcast::Sender<SegmentEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
    config_tx: Mutex<Option<Sender<PipelineConfig>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VoicegateEngine {
    pub fn new(config: PipelineConfig) -> Self {
        let (segment_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config: Mutex::new(config),
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            segment_tx,
            activity_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            config_tx: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Start the pipeline thread and hand back the PCM producer for the
    /// capture collaborator.
    pub fn start(&self) -> Result<PcmProducer> {
        let config = self.config.lock().clone();
        config.validate().map_err(VoicegateError::InvalidConfig)?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(VoicegateError::AlreadyRunning);
        }

        info!(
            sample_rate = config.sample_rate,
            use_bandpass = config.use_bandpass,
            auto_gain = config.auto_gain_enabled,
            "starting conditioning engine"
        );

        let (producer, consumer) = create_pcm_ring();
        let (config_tx, config_rx) = crossbeam_channel::bounded(CONFIG_QUEUE_CAP);
        *self.config_tx.lock() = Some(config_tx);
        self.diagnostics.reset();

        let ctx = PipelineContext {
            config,
            consumer,
            running: Arc::clone(&self.running),
            config_rx,
            segment_tx: self.segment_tx.clone(),
            activity_tx: self.activity_tx.clone(),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        let handle = std::thread::Builder::new()
            .name("voicegate-pipeline".into())
            .spawn(move || pipeline::run(ctx))
            .map_err(VoicegateError::Io)?;
        *self.worker.lock() = Some(handle);

        self.set_status(EngineStatus::Running, None);
        Ok(producer)
    }

    /// Stop the pipeline. Blocks until the thread has exited, so any forced
    /// flush segment is already broadcast when this returns.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(VoicegateError::NotRunning);
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("pipeline thread panicked during shutdown");
            }
        }
        *self.config_tx.lock() = None;

        self.set_status(EngineStatus::Stopped, None);
        info!("conditioning engine stopped");
        Ok(())
    }

    /// Replace the configuration. Takes effect at the next chunk boundary
    /// when running; otherwise applies on the next `start()`.
    pub fn apply_config(&self, config: PipelineConfig) {
        *self.config.lock() = config.clone();
        if let Some(tx) = self.config_tx.lock().as_ref() {
            if tx.try_send(config).is_err() {
                warn!("config queue full — update dropped, latest settings apply on restart");
            }
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.config.lock().clone()
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Subscribe to finished speech segments.
    pub fn subscribe_segments(&self) -> broadcast::Receiver<SegmentEvent> {
        self.segment_tx.subscribe()
    }

    /// Subscribe to per-chunk level/recording telemetry.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Subscribe to lifecycle status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.status_tx.send(EngineStatusEvent { status, detail });
    }
}

impl Default for VoicegateEngine {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Drop for VoicegateEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
