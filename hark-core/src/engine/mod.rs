//! `HarkEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! HarkEngine::new()
//!     └─► warm_up()          → classifier loaded, status = WarmingUp → Idle
//!         └─► start()        → audio open, capture + inference spawned,
//!             │                status = Listening
//!             └─► stop()     → running=false, stream dropped, status = Stopped
//! ```
//!
//! `start()`/`stop()` in the wrong state return an error rather than
//! panicking, so front-ends can wire them to buttons without guarding.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). `AudioCapture` is therefore created *inside* the capture
//! `spawn_blocking` closure so it never crosses a thread boundary. A sync
//! oneshot channel propagates open-device errors back to the `start()`
//! caller. The inference loop runs in a second `spawn_blocking`, joined to
//! capture by a bounded crossbeam queue of assembled windows.

pub mod capture;
pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::{
    audio::AudioCapture,
    buffering::create_audio_ring,
    error::{HarkError, Result},
    events::{DetectionEvent, EngineStatus, EngineStatusEvent},
    features::FeatureConfig,
    inference::ClassifierHandle,
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `HarkEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pipeline sample rate (Hz). Audio captured at other rates is resampled.
    /// Default: 16000.
    pub sample_rate: u32,
    /// Duration of one half-window granule, in seconds. Consecutive analysis
    /// windows overlap by exactly this much. Default: 1.
    pub record_seconds: u32,
    /// Capacity of the capture → inference window queue. When the classifier
    /// falls behind, the newest windows are dropped rather than queued
    /// without bound. Default: 64.
    pub queue_capacity: usize,
    /// Waveform conditioning tunables (silence threshold, crop radius,
    /// canonical length).
    pub features: FeatureConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            record_seconds: 1,
            queue_capacity: 64,
            features: FeatureConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Samples in one half-window granule (`record_seconds` at the pipeline
    /// rate). Default: 16000.
    pub fn half_window_samples(&self) -> usize {
        self.sample_rate as usize * self.record_seconds as usize
    }

    /// Samples in one full analysis window (two granules). Default: 32000.
    pub fn window_samples(&self) -> usize {
        2 * self.half_window_samples()
    }

    /// Samples discarded from the start of capture while the device settles.
    pub fn warmup_discard_samples(&self) -> usize {
        self.half_window_samples()
    }
}

/// The top-level engine handle.
///
/// `HarkEngine` is `Send + Sync` — all fields use interior mutability. Wrap
/// in `Arc<HarkEngine>` to share between front-end state and
/// event-forwarding async tasks.
pub struct HarkEngine {
    config: EngineConfig,
    classifier: ClassifierHandle,
    /// `true` while capture + inference are active.
    running: Arc<AtomicBool>,
    /// Canonical status (written via Mutex, read from commands).
    status: Arc<Mutex<EngineStatus>>,
    detection_tx: broadcast::Sender<DetectionEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Monotonically increasing detection sequence counter.
    seq: Arc<AtomicU64>,
    /// Shared capture + inference diagnostics counters.
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl HarkEngine {
    /// Create a new engine. Does not start capturing — call `warm_up()` then
    /// `start()`.
    pub fn new(config: EngineConfig, classifier: ClassifierHandle) -> Self {
        let (detection_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            classifier,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            detection_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        }
    }

    /// Warm up the classifier (load weights, run a dummy inference).
    ///
    /// Call once at application startup, before `start()`.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up command classifier");
        if let Err(e) = self.classifier.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Idle, None);
        info!("command classifier ready");
        Ok(())
    }

    /// Start audio capture and the inference pipeline.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. Both loops continue running on background blocking threads.
    ///
    /// # Errors
    /// - `HarkError::AlreadyRunning` if already started.
    /// - `HarkError::NoDefaultInputDevice` / `HarkError::AudioStream` on
    ///   device errors.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    ///
    /// `None` selects the system default input.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(HarkError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::Listening, None);

        let (producer, consumer) = create_audio_ring();
        let (window_tx, window_rx) =
            crossbeam_channel::bounded(self.config.queue_capacity.max(1));

        // Clone all Arc-wrapped state before moving into the closures.
        let config = self.config.clone();
        let classifier = self.classifier.clone();
        let running = Arc::clone(&self.running);
        let detection_tx = self.detection_tx.clone();
        let status_tx = self.status_tx.clone();
        let status = Arc::clone(&self.status);
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Sync oneshot: capture thread signals open success/failure back to
        // start(). Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        // ── Inference context ────────────────────────────────────────────
        {
            let config = config.clone();
            let running = Arc::clone(&running);
            let diagnostics = Arc::clone(&diagnostics);
            tokio::task::spawn_blocking(move || {
                pipeline::run(pipeline::PipelineContext {
                    config,
                    classifier,
                    window_rx,
                    running,
                    detection_tx,
                    seq,
                    diagnostics,
                });
            });
        }

        // ── Capture context ──────────────────────────────────────────────
        let preferred = preferred_input_device;
        tokio::task::spawn_blocking(move || {
            // Open the audio device on THIS thread — cpal::Stream is !Send.
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let exit = capture::run(capture::CaptureContext {
                config,
                consumer,
                window_tx,
                running: Arc::clone(&running),
                stream_failed: Arc::clone(&capture.failed),
                capture_sample_rate: capture.sample_rate,
                diagnostics,
            });

            if exit == capture::CaptureExit::StreamFailed {
                error!("audio stream failed — session terminated");
                running.store(false, Ordering::SeqCst);
                *status.lock() = EngineStatus::Error;
                let _ = status_tx.send(EngineStatusEvent {
                    status: EngineStatus::Error,
                    detail: Some("audio stream failed".into()),
                });
            }

            // Stream drops here, releasing the audio device on this thread.
            drop(capture);
        });

        // Block start() until device open is confirmed.
        match open_rx.recv() {
            Ok(Ok(rate)) => {
                info!(capture_rate = rate, "engine started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent — capture task died?
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("capture failed to start".into()));
                Err(HarkError::Other(anyhow::anyhow!(
                    "capture task died unexpectedly"
                )))
            }
        }
    }

    /// Stop audio capture and the inference pipeline.
    ///
    /// # Errors
    /// - `HarkError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(HarkError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to live detection events.
    pub fn subscribe_detections(&self) -> broadcast::Receiver<DetectionEvent> {
        self.detection_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of capture + inference counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
