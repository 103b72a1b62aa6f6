//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond a reused scratch buffer)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by writing directly into an SPSC ring
//! buffer producer whose `push_slice` is lock-free. A full ring is tolerated,
//! not fatal: frames are dropped with a warning (freshness over completeness).
//! A stream error, by contrast, sets a shared failure flag that the capture
//! loop treats as fatal for the session.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread. The engine accomplishes this by opening it inside `spawn_blocking`.

pub mod device;
pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{HarkError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Set by the cpal error callback; the capture loop treats it as fatal.
    pub failed: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| HarkError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(HarkError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| HarkError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let failed = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(
                &device,
                &config,
                channels,
                producer,
                Arc::clone(&running),
                Arc::clone(&failed),
                |s| s,
            ),
            SampleFormat::I16 => build_stream::<i16>(
                &device,
                &config,
                channels,
                producer,
                Arc::clone(&running),
                Arc::clone(&failed),
                |s| s as f32 / 32_768.0,
            ),
            SampleFormat::U8 => build_stream::<u8>(
                &device,
                &config,
                channels,
                producer,
                Arc::clone(&running),
                Arc::clone(&failed),
                |s| (s as f32 - 128.0) / 128.0,
            ),
            fmt => {
                return Err(HarkError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| HarkError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            failed,
            sample_rate,
        })
    }

    /// Open the system default microphone and push f32 mono frames into
    /// `producer`.
    ///
    /// Must be called from the thread that will also drop this value — in
    /// practice, inside `tokio::task::spawn_blocking`.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the stream reported an unrecoverable error.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Build an input stream that downmixes interleaved frames to mono f32 and
/// pushes them into the ring buffer producer.
#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    to_f32: fn(T) -> f32,
) -> Result<Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let mut mono_buf: Vec<f32> = Vec::new();
    let err_failed = Arc::clone(&failed);

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / channels;
                mono_buf.resize(frames, 0.0);
                if channels == 1 {
                    for (out, sample) in mono_buf.iter_mut().zip(data.iter()) {
                        *out = to_f32(*sample);
                    }
                } else {
                    for (f, out) in mono_buf.iter_mut().enumerate() {
                        let base = f * channels;
                        let mut sum = 0f32;
                        for c in 0..channels {
                            sum += to_f32(data[base + c]);
                        }
                        *out = sum / channels as f32;
                    }
                }
                let written = producer.push_slice(&mono_buf);
                if written < mono_buf.len() {
                    warn!("ring buffer full: dropped {} frames", mono_buf.len() - written);
                }
            },
            move |err| {
                error!("audio stream error: {err}");
                err_failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| HarkError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(HarkError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}
