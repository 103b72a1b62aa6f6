//! Blocking inference loop — the consumer side of the window queue.
//!
//! ## Stages (per dequeued window)
//!
//! ```text
//! 1. Duplicate-suppression gate: skip this window if the previous one
//!    classified successfully (windows overlap by half)
//! 2. Feature extraction: silence gate → condition → magnitude STFT
//! 3. Classification: fixed-shape tensor → probability vector → argmax
//! 4. Broadcast DetectionEvent
//! ```
//!
//! The loop runs in `spawn_blocking`, keeping the Tokio async executor free
//! for event forwarding. A classification error is logged and counted, never
//! fatal — the next window gets a fresh attempt.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    buffering::assembler::AnalysisWindow,
    engine::EngineConfig,
    events::DetectionEvent,
    features::{self, Spectrogram},
    gate::OverlapGate,
    inference::{self, ClassifierHandle},
};

/// How long the consumer blocks waiting for a window before re-checking the
/// running flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

pub struct PipelineDiagnostics {
    /// Raw f32 frames drained from the capture ring.
    pub frames_in: AtomicUsize,
    /// Full analysis windows emitted by the assembler.
    pub windows_assembled: AtomicUsize,
    /// Windows dropped because the handoff queue was full.
    pub windows_dropped: AtomicUsize,
    /// Windows dequeued by the inference loop.
    pub windows_in: AtomicUsize,
    /// Windows discarded by the duplicate-suppression gate.
    pub windows_skipped: AtomicUsize,
    /// Windows below the silence threshold.
    pub silent_windows: AtomicUsize,
    pub inference_calls: AtomicUsize,
    pub inference_errors: AtomicUsize,
    pub detections_emitted: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            frames_in: AtomicUsize::new(0),
            windows_assembled: AtomicUsize::new(0),
            windows_dropped: AtomicUsize::new(0),
            windows_in: AtomicUsize::new(0),
            windows_skipped: AtomicUsize::new(0),
            silent_windows: AtomicUsize::new(0),
            inference_calls: AtomicUsize::new(0),
            inference_errors: AtomicUsize::new(0),
            detections_emitted: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.windows_assembled.store(0, Ordering::Relaxed);
        self.windows_dropped.store(0, Ordering::Relaxed);
        self.windows_in.store(0, Ordering::Relaxed);
        self.windows_skipped.store(0, Ordering::Relaxed);
        self.silent_windows.store(0, Ordering::Relaxed);
        self.inference_calls.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.detections_emitted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            windows_assembled: self.windows_assembled.load(Ordering::Relaxed),
            windows_dropped: self.windows_dropped.load(Ordering::Relaxed),
            windows_in: self.windows_in.load(Ordering::Relaxed),
            windows_skipped: self.windows_skipped.load(Ordering::Relaxed),
            silent_windows: self.silent_windows.load(Ordering::Relaxed),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            detections_emitted: self.detections_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub windows_assembled: usize,
    pub windows_dropped: usize,
    pub windows_in: usize,
    pub windows_skipped: usize,
    pub silent_windows: usize,
    pub inference_calls: usize,
    pub inference_errors: usize,
    pub detections_emitted: usize,
}

/// All context the inference loop needs, passed as one struct so the closure
/// stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub classifier: ClassifierHandle,
    pub window_rx: crossbeam_channel::Receiver<AnalysisWindow>,
    pub running: Arc<AtomicBool>,
    pub detection_tx: broadcast::Sender<DetectionEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking inference loop until `ctx.running` becomes false.
pub fn run(ctx: PipelineContext) {
    info!("inference loop started");

    let spectrogram = Spectrogram::new();
    let mut gate = OverlapGate::new();

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let window = match ctx.window_rx.recv_timeout(RECV_TIMEOUT) {
            Ok(w) => w,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("window queue disconnected — capture side gone");
                break;
            }
        };

        ctx.diagnostics.windows_in.fetch_add(1, Ordering::Relaxed);

        if !gate.admit() {
            // Overlapping sibling of a window that already produced a label.
            ctx.diagnostics
                .windows_skipped
                .fetch_add(1, Ordering::Relaxed);
            debug!("window skipped after previous success");
            continue;
        }

        let Some(feature_matrix) = features::extract(&window, &ctx.config.features, &spectrogram)
        else {
            ctx.diagnostics
                .silent_windows
                .fetch_add(1, Ordering::Relaxed);
            gate.record(false);
            continue;
        };

        ctx.diagnostics
            .inference_calls
            .fetch_add(1, Ordering::Relaxed);

        match inference::classify(&feature_matrix, &ctx.classifier) {
            Ok(result) => {
                gate.record(true);
                ctx.diagnostics
                    .detections_emitted
                    .fetch_add(1, Ordering::Relaxed);

                let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
                let event = DetectionEvent {
                    seq,
                    label: result.label.to_string(),
                    scores: result.scores,
                };
                let emitted = ctx.detection_tx.send(event).is_ok();
                info!(seq, label = result.label, emitted, "command detected");
            }
            Err(e) => {
                gate.record(false);
                ctx.diagnostics
                    .inference_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!("classification error: {e}");
            }
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        windows_in = snap.windows_in,
        windows_skipped = snap.windows_skipped,
        silent_windows = snap.silent_windows,
        inference_calls = snap.inference_calls,
        inference_errors = snap.inference_errors,
        detections_emitted = snap.detections_emitted,
        "inference loop stopped — diagnostics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Instant;

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::inference::stub::StubClassifier;

    /// 32000-sample window loud enough to pass the silence gate.
    fn loud_window() -> AnalysisWindow {
        (0..32_000)
            .map(|i| if i % 2 == 0 { 10_000 } else { -10_000 })
            .collect()
    }

    fn silent_window() -> AnalysisWindow {
        vec![0i16; 32_000]
    }

    fn recv_event_with_timeout(
        rx: &mut broadcast::Receiver<DetectionEvent>,
        timeout: Duration,
    ) -> DetectionEvent {
        let start = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(ev) => return ev,
                Err(TryRecvError::Empty) => {
                    if start.elapsed() >= timeout {
                        panic!("timed out waiting for detection event");
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("detection channel closed unexpectedly"),
            }
        }
    }

    fn assert_no_event_for(rx: &mut broadcast::Receiver<DetectionEvent>, timeout: Duration) {
        let start = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(ev) => panic!("expected no event, got seq={}", ev.seq),
                Err(TryRecvError::Empty) => {
                    if start.elapsed() >= timeout {
                        return;
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => return,
            }
        }
    }

    struct Harness {
        window_tx: crossbeam_channel::Sender<AnalysisWindow>,
        detection_rx: broadcast::Receiver<DetectionEvent>,
        running: Arc<AtomicBool>,
        diagnostics: Arc<PipelineDiagnostics>,
        handle: thread::JoinHandle<()>,
    }

    fn spawn_pipeline(classifier: ClassifierHandle) -> Harness {
        let (window_tx, window_rx) = crossbeam_channel::bounded(64);
        let (detection_tx, detection_rx) = broadcast::channel(16);
        let running = Arc::new(AtomicBool::new(true));
        let diagnostics = Arc::new(PipelineDiagnostics::default());

        let ctx = PipelineContext {
            config: EngineConfig::default(),
            classifier,
            window_rx,
            running: Arc::clone(&running),
            detection_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::clone(&diagnostics),
        };
        let handle = thread::spawn(move || run(ctx));

        Harness {
            window_tx,
            detection_rx,
            running,
            diagnostics,
            handle,
        }
    }

    impl Harness {
        fn shutdown(self) -> Arc<PipelineDiagnostics> {
            self.running.store(false, Ordering::SeqCst);
            self.handle.join().expect("pipeline thread panicked");
            self.diagnostics
        }
    }

    #[test]
    fn loud_window_produces_a_detection() {
        let mut h = spawn_pipeline(ClassifierHandle::new(StubClassifier::favoring(2)));
        h.window_tx.send(loud_window()).unwrap();

        let event = recv_event_with_timeout(&mut h.detection_rx, Duration::from_secs(5));
        assert_eq!(event.seq, 0);
        assert_eq!(event.label, "stop");
        assert_eq!(event.display_label(), "STOP");
        assert_eq!(event.scores.len(), 8);

        let diag = h.shutdown();
        assert_eq!(diag.detections_emitted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn overlapping_sibling_of_a_success_is_skipped() {
        let mut h = spawn_pipeline(ClassifierHandle::new(StubClassifier::favoring(5)));
        // Two consecutive loud windows: the second shares half its samples
        // with the first and must be discarded without classification.
        h.window_tx.send(loud_window()).unwrap();
        h.window_tx.send(loud_window()).unwrap();
        h.window_tx.send(loud_window()).unwrap();

        let first = recv_event_with_timeout(&mut h.detection_rx, Duration::from_secs(5));
        let second = recv_event_with_timeout(&mut h.detection_rx, Duration::from_secs(5));
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_no_event_for(&mut h.detection_rx, Duration::from_millis(100));

        let diag = h.shutdown();
        assert_eq!(diag.windows_in.load(Ordering::Relaxed), 3);
        assert_eq!(diag.windows_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(diag.inference_calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn silent_window_keeps_gate_armed_and_emits_nothing() {
        let mut h = spawn_pipeline(ClassifierHandle::new(StubClassifier::favoring(0)));
        h.window_tx.send(silent_window()).unwrap();
        h.window_tx.send(loud_window()).unwrap();

        // The silent window produced nothing, but did not consume the gate:
        // the loud window right after it still classifies.
        let event = recv_event_with_timeout(&mut h.detection_rx, Duration::from_secs(5));
        assert_eq!(event.label, "up");

        let diag = h.shutdown();
        assert_eq!(diag.silent_windows.load(Ordering::Relaxed), 1);
        assert_eq!(diag.windows_skipped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn classifier_error_is_counted_and_loop_survives() {
        // Three-entry score vector is rejected by the adapter.
        let mut h = spawn_pipeline(ClassifierHandle::new(StubClassifier::with_scores(vec![
            0.5;
            3
        ])));
        h.window_tx.send(loud_window()).unwrap();
        h.window_tx.send(loud_window()).unwrap();

        assert_no_event_for(&mut h.detection_rx, Duration::from_millis(200));

        let diag = h.shutdown();
        assert_eq!(diag.inference_errors.load(Ordering::Relaxed), 2);
        assert_eq!(diag.detections_emitted.load(Ordering::Relaxed), 0);
        // Errors keep the gate armed, so both windows were attempted.
        assert_eq!(diag.inference_calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn queue_disconnect_terminates_the_loop() {
        let h = spawn_pipeline(ClassifierHandle::new(StubClassifier::favoring(0)));
        drop(h.window_tx);
        h.handle.join().expect("pipeline thread panicked");
    }
}
