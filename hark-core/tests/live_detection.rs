//! End-to-end: ring buffer → capture loop → window queue → inference loop →
//! detection events, with a stub classifier standing in for the model.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use hark_core::buffering::{create_audio_ring, AudioProducer, Producer};
use hark_core::engine::{capture, pipeline, EngineConfig};
use hark_core::events::DetectionEvent;
use hark_core::inference::stub::StubClassifier;
use hark_core::ClassifierHandle;

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
            Ok(ev) => panic!("expected no event, got seq={} label={}", ev.seq, ev.label),
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

struct Session {
    producer: AudioProducer,
    detection_rx: broadcast::Receiver<DetectionEvent>,
    running: Arc<AtomicBool>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    capture_handle: thread::JoinHandle<capture::CaptureExit>,
    pipeline_handle: thread::JoinHandle<()>,
}

fn start_session(classifier: ClassifierHandle) -> Session {
    let config = EngineConfig::default();
    let (producer, consumer) = create_audio_ring();
    let (window_tx, window_rx) = crossbeam_channel::bounded(config.queue_capacity);
    let (detection_tx, detection_rx) = broadcast::channel(32);
    let running = Arc::new(AtomicBool::new(true));
    let diagnostics = Arc::new(pipeline::PipelineDiagnostics::default());

    let capture_ctx = capture::CaptureContext {
        config: config.clone(),
        consumer,
        window_tx,
        running: Arc::clone(&running),
        stream_failed: Arc::new(AtomicBool::new(false)),
        capture_sample_rate: config.sample_rate,
        diagnostics: Arc::clone(&diagnostics),
    };
    let pipeline_ctx = pipeline::PipelineContext {
        config,
        classifier,
        window_rx,
        running: Arc::clone(&running),
        detection_tx,
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::clone(&diagnostics),
    };

    let capture_handle = thread::spawn(move || capture::run(capture_ctx));
    let pipeline_handle = thread::spawn(move || pipeline::run(pipeline_ctx));

    Session {
        producer,
        detection_rx,
        running,
        diagnostics,
        capture_handle,
        pipeline_handle,
    }
}

impl Session {
    /// Push one second of audio, blocking until the ring accepts it all.
    fn push_block(&mut self, block: &[f32]) {
        let mut written = 0;
        while written < block.len() {
            written += self.producer.push_slice(&block[written..]);
            if written < block.len() {
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    fn shutdown(self) -> Arc<pipeline::PipelineDiagnostics> {
        self.running.store(false, Ordering::SeqCst);
        let exit = self.capture_handle.join().expect("capture thread panicked");
        assert_eq!(exit, capture::CaptureExit::Stopped);
        self.pipeline_handle
            .join()
            .expect("pipeline thread panicked");
        self.diagnostics
    }
}

/// One second of audio loud enough to pass the silence gate once converted
/// to the 16-bit scale.
fn loud_second() -> Vec<f32> {
    (0..16_000)
        .map(|i| if i % 2 == 0 { 0.4 } else { -0.4 })
        .collect()
}

fn quiet_second() -> Vec<f32> {
    vec![0.001; 16_000]
}

#[test]
fn spoken_command_produces_one_detection_despite_overlap() {
    let mut session = start_session(ClassifierHandle::new(StubClassifier::favoring(3)));

    // Warm-up second (discarded) plus three loud seconds. The three loud
    // granules assemble into two overlapping windows; the gate admits only
    // the first.
    session.push_block(&quiet_second());
    for _ in 0..3 {
        session.push_block(&loud_second());
    }

    let event = recv_event_with_timeout(&mut session.detection_rx, Duration::from_secs(10));
    assert_eq!(event.seq, 0);
    assert_eq!(event.label, "left");
    assert_eq!(event.display_label(), "LEFT");
    assert_eq!(event.scores.len(), 8);

    assert_no_event_for(&mut session.detection_rx, Duration::from_millis(300));

    let diag = session.shutdown();
    assert_eq!(diag.windows_assembled.load(Ordering::Relaxed), 2);
    assert_eq!(diag.windows_skipped.load(Ordering::Relaxed), 1);
    assert_eq!(diag.detections_emitted.load(Ordering::Relaxed), 1);
    assert_eq!(diag.windows_dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn silence_produces_no_detections() {
    let mut session = start_session(ClassifierHandle::new(StubClassifier::favoring(0)));

    // Warm-up plus three quiet seconds → two silent windows, zero events.
    for _ in 0..4 {
        session.push_block(&quiet_second());
    }

    let start = Instant::now();
    while session.diagnostics.silent_windows.load(Ordering::Relaxed) < 2 {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "silent windows never reached the pipeline"
        );
        thread::sleep(Duration::from_millis(5));
    }
    assert_no_event_for(&mut session.detection_rx, Duration::from_millis(200));

    let diag = session.shutdown();
    assert_eq!(diag.detections_emitted.load(Ordering::Relaxed), 0);
    assert_eq!(diag.inference_calls.load(Ordering::Relaxed), 0);
}

#[test]
fn alternating_commands_detect_every_other_window() {
    let mut session = start_session(ClassifierHandle::new(StubClassifier::favoring(7)));

    // Warm-up plus five loud seconds → four overlapping windows. With every
    // window non-silent, successes alternate: windows 1 and 3 classify,
    // windows 2 and 4 are suppressed.
    session.push_block(&quiet_second());
    for _ in 0..5 {
        session.push_block(&loud_second());
    }

    let first = recv_event_with_timeout(&mut session.detection_rx, Duration::from_secs(10));
    let second = recv_event_with_timeout(&mut session.detection_rx, Duration::from_secs(10));
    assert_eq!(first.seq, 0);
    assert_eq!(second.seq, 1);
    assert_eq!(first.label, "yes");
    assert_eq!(second.label, "yes");

    let diag = session.shutdown();
    assert_eq!(diag.windows_assembled.load(Ordering::Relaxed), 4);
    assert_eq!(diag.windows_skipped.load(Ordering::Relaxed), 2);
    assert_eq!(diag.detections_emitted.load(Ordering::Relaxed), 2);
}
