//! Blocking capture loop — the producer side of the window queue.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Drain the SPSC ring → f32 chunk at the capture rate
//! 2. Resample to the pipeline rate (passthrough when rates match)
//! 3. Discard the first second of capture (device settling transient)
//! 4. Convert f32 → i16 on the 16-bit scale
//! 5. Accumulate half-window granules; feed the overlap assembler
//! 6. try_send each full window to the inference queue (drop on full)
//! ```
//!
//! A full queue is tolerated: the newest window is dropped and counted so a
//! stalled classifier never backs pressure into the audio callback. A stream
//! failure is fatal to the session — the loop exits and the engine marks the
//! session errored.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::{
    audio::resample::RateConverter,
    buffering::{assembler::AnalysisWindow, assembler::WindowAssembler, AudioConsumer, Consumer},
    engine::{pipeline::PipelineDiagnostics, EngineConfig},
};

/// Chunk size drained from the ring buffer per iteration.
/// 20 ms at 48 kHz = 960 samples — a practical rubato block size.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY: Duration = Duration::from_millis(5);

/// Why the capture loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// `running` flipped false — normal shutdown.
    Stopped,
    /// The audio stream reported an unrecoverable error.
    StreamFailed,
}

pub struct CaptureContext {
    pub config: EngineConfig,
    pub consumer: AudioConsumer,
    pub window_tx: crossbeam_channel::Sender<AnalysisWindow>,
    pub running: Arc<AtomicBool>,
    /// Set by the cpal error callback.
    pub stream_failed: Arc<AtomicBool>,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking capture loop until `ctx.running` becomes false or the
/// stream fails.
pub fn run(mut ctx: CaptureContext) -> CaptureExit {
    info!(
        capture_rate = ctx.capture_sample_rate,
        pipeline_rate = ctx.config.sample_rate,
        "capture loop started"
    );

    let mut resampler = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.config.sample_rate,
        DRAIN_CHUNK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            return CaptureExit::StreamFailed;
        }
    };

    let half_len = ctx.config.half_window_samples();
    let mut assembler = WindowAssembler::new(ctx.config.window_samples());

    // Scratch chunk, reused each iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    // i16 samples accumulating toward the next half-window granule.
    let mut half_buf: Vec<i16> = Vec::with_capacity(half_len);
    // Samples still to throw away from the start of capture.
    let mut discard_remaining = ctx.config.warmup_discard_samples();
    let mut dropped_total = 0usize;

    let exit = 'session: loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break 'session CaptureExit::Stopped;
        }
        if ctx.stream_failed.load(Ordering::Relaxed) {
            error!("audio stream failure detected — ending capture session");
            break 'session CaptureExit::StreamFailed;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }
        ctx.diagnostics.frames_in.fetch_add(n, Ordering::Relaxed);

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial rubato block — waiting for more input.
            continue;
        }

        // First second of capture carries the device settling transient and
        // is discarded before any window can form.
        let mut samples = &resampled[..];
        if discard_remaining > 0 {
            let discard = discard_remaining.min(samples.len());
            discard_remaining -= discard;
            samples = &samples[discard..];
            if discard_remaining == 0 {
                debug!("capture warm-up discard complete");
            }
            if samples.is_empty() {
                continue;
            }
        }

        half_buf.extend(
            samples
                .iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16),
        );

        while half_buf.len() >= half_len {
            let granule: Vec<i16> = half_buf.drain(..half_len).collect();
            let Some(window) = assembler.push_half(&granule) else {
                continue;
            };
            ctx.diagnostics
                .windows_assembled
                .fetch_add(1, Ordering::Relaxed);

            match ctx.window_tx.try_send(window) {
                Ok(()) => {}
                Err(crossbeam_channel::TrySendError::Full(_)) => {
                    ctx.diagnostics
                        .windows_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    dropped_total += 1;
                    warn!(dropped_total, "window queue full — dropping window");
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                    debug!("window queue disconnected — inference side gone");
                    break 'session CaptureExit::Stopped;
                }
            }
        }
    };

    info!(?exit, "capture loop stopped");
    exit
}
