//! WAV loading for the one-shot classification path.
//!
//! The contract is mono 16-bit PCM. The declared sample rate is trusted to
//! match the pipeline's fixed 16 kHz assumption — a mismatch is logged, not
//! corrected. Anything malformed surfaces as a load error before feature
//! extraction begins.

use std::path::Path;

use tracing::warn;

use crate::error::{HarkError, Result};

/// A fully-loaded waveform with its declared sample rate.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Load a mono 16-bit PCM WAV file.
///
/// # Errors
/// `HarkError::WavLoad` for unreadable files, non-mono or non-16-bit-int
/// formats, and files containing no samples.
pub fn load_mono_i16(path: &Path, expected_rate: u32) -> Result<WavAudio> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| HarkError::WavLoad(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(HarkError::WavLoad(format!(
            "{}: expected mono, got {} channels",
            path.display(),
            spec.channels
        )));
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(HarkError::WavLoad(format!(
            "{}: expected 16-bit int PCM, got {}-bit {:?}",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        )));
    }
    if spec.sample_rate != expected_rate {
        warn!(
            declared = spec.sample_rate,
            expected = expected_rate,
            "wav sample rate differs from the pipeline rate; using it as-is"
        );
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| HarkError::WavLoad(format!("{}: {e}", path.display())))?;
    if samples.is_empty() {
        return Err(HarkError::WavLoad(format!(
            "{}: contains no samples",
            path.display()
        )));
    }

    Ok(WavAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
