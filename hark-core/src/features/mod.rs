//! Waveform conditioning and feature extraction.
//!
//! ## Pipeline (order is a hard contract, matching the classifier's training)
//!
//! ```text
//! i16 window
//!   1. silence gate     peak-to-peak on the 16-bit scale < threshold → no result
//!   2. normalize        divide by max |sample|
//!   3. re-span          2·(v − min)/ptp − 1  → spans exactly [-1, 1]
//!   4. crop             ±crop_radius around the max-value sample, clamped
//!   5. pad              zero-pad right to canonical_len
//!   6. magnitude STFT   → Array2<f32> (N_FREQS × frames)
//! ```
//!
//! Silence is a defined "no result" outcome, not an error: the live pipeline
//! feeds it to the duplicate-suppression gate and the one-shot path reports
//! the file as too silent.

pub mod stft;

use ndarray::Array2;
use tracing::debug;

pub use stft::{Spectrogram, FFT_LEN, N_FREQS, OVERLAP, SEGMENT_LEN};

/// Full-scale value for 16-bit samples, used for the silence-gate scaling.
const I16_FULL_SCALE: f32 = 32_768.0;

/// Tunables for waveform conditioning.
///
/// The defaults are empirical constants tied to the reference
/// 16 kHz / 1-second configuration; they are parameters here rather than
/// inline literals so alternative deployments can adjust them.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Peak-to-peak threshold (on the 16-bit scale) below which a window is
    /// treated as silence. Default: 0.3.
    pub silence_ptp: f32,
    /// Samples kept on each side of the loudest sample. Default: 8000.
    pub crop_radius: usize,
    /// Length the cropped segment is zero-padded to before the transform.
    /// Default: 16000 (1 s at 16 kHz).
    pub canonical_len: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            silence_ptp: 0.3,
            crop_radius: 8_000,
            canonical_len: 16_000,
        }
    }
}

/// Condition a raw i16 waveform into a canonical-length f32 waveform.
///
/// Returns `None` when the input is silent (peak-to-peak below threshold) or
/// empty. Inputs shorter than the crop span are handled by the clamped crop
/// bounds and right-padding — never an error.
pub fn condition(samples: &[i16], cfg: &FeatureConfig) -> Option<Vec<f32>> {
    if samples.is_empty() {
        return None;
    }

    let mut min = samples[0];
    let mut max = samples[0];
    for &s in samples {
        min = min.min(s);
        max = max.max(s);
    }
    let ptp = (max as f32 - min as f32) / I16_FULL_SCALE;
    if ptp < cfg.silence_ptp {
        debug!(ptp, threshold = cfg.silence_ptp, "window below silence threshold");
        return None;
    }

    // Normalize by max absolute value. Nonzero: the gate above guarantees a
    // nonzero peak-to-peak.
    let wmax = samples
        .iter()
        .map(|&s| (s as f32).abs())
        .fold(0.0f32, f32::max);
    let mut waveform: Vec<f32> = samples.iter().map(|&s| s as f32 / wmax).collect();

    // Re-span to exactly [-1, 1].
    let (mut lo, mut hi) = (waveform[0], waveform[0]);
    for &v in &waveform {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let span = hi - lo;
    for v in waveform.iter_mut() {
        *v = 2.0 * (*v - lo) / span - 1.0;
    }

    // Crop around the loudest sample, clamped to the buffer bounds.
    let peak = argmax(&waveform);
    let start = peak.saturating_sub(cfg.crop_radius);
    let end = (peak + cfg.crop_radius).min(waveform.len());

    let mut padded = vec![0f32; cfg.canonical_len];
    let copy_len = (end - start).min(cfg.canonical_len);
    padded[..copy_len].copy_from_slice(&waveform[start..start + copy_len]);
    Some(padded)
}

/// Condition `samples` and compute the magnitude STFT.
///
/// `None` means silence — the "unsuccessful" signal consumed by the gate and
/// the one-shot path. For any non-silent input the output shape is constant:
/// `(N_FREQS, stft::n_frames(cfg.canonical_len))`.
pub fn extract(samples: &[i16], cfg: &FeatureConfig, spec: &Spectrogram) -> Option<Array2<f32>> {
    let waveform = condition(samples, cfg)?;
    Some(spec.compute(&waveform))
}

/// Index of the first maximum value.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
