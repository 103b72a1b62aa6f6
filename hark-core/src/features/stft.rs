//! Magnitude short-time Fourier transform.
//!
//! Matches the reference training frontend (scipy `signal.stft` defaults):
//! periodic Hann window, zero `boundary` extension of `nperseg / 2` samples
//! on each side, right-padding to a whole number of segments, and output
//! scaled by `1 / sum(window)`. The classifier was trained against exactly
//! this transform, so the parameters are fixed constants rather than config.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Arc;

/// Samples per STFT segment.
pub const SEGMENT_LEN: usize = 255;
/// Overlapping samples between consecutive segments.
pub const OVERLAP: usize = 124;
/// FFT length (segments are zero-padded from `SEGMENT_LEN`).
pub const FFT_LEN: usize = 256;
/// Hop between segment starts.
pub const STEP: usize = SEGMENT_LEN - OVERLAP;
/// One-sided output bins.
pub const N_FREQS: usize = FFT_LEN / 2 + 1;

/// Number of output frames for an input of `n` samples, including the
/// boundary extension and final-segment padding.
pub fn n_frames(n: usize) -> usize {
    let extended = n + 2 * (SEGMENT_LEN / 2);
    let remainder = (extended - SEGMENT_LEN) % STEP;
    let padded = if remainder == 0 {
        extended
    } else {
        extended + STEP - remainder
    };
    (padded - SEGMENT_LEN) / STEP + 1
}

/// Reusable magnitude-STFT plan (window + FFT twiddles built once).
pub struct Spectrogram {
    window: Vec<f32>,
    scale: f32,
    fft: Arc<dyn rustfft::Fft<f32>>,
}

impl Spectrogram {
    pub fn new() -> Self {
        let window = periodic_hann(SEGMENT_LEN);
        let scale = 1.0 / window.iter().sum::<f32>();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FFT_LEN);
        Self { window, scale, fft }
    }

    /// Compute the magnitude STFT of `samples`.
    ///
    /// Output shape is `(N_FREQS, n_frames(samples.len()))` — frequency bins
    /// down the rows, time frames across the columns.
    pub fn compute(&self, samples: &[f32]) -> Array2<f32> {
        let frames = n_frames(samples.len());
        let pad = SEGMENT_LEN / 2;
        let total = (frames - 1) * STEP + SEGMENT_LEN;

        // Zero-extended input: [pad zeros] ++ samples ++ [zeros to fit frames].
        let mut extended = vec![0f32; total];
        extended[pad..pad + samples.len()].copy_from_slice(samples);

        let mut out = Array2::<f32>::zeros((N_FREQS, frames));
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); FFT_LEN];

        for frame in 0..frames {
            let start = frame * STEP;
            for v in fft_buf.iter_mut() {
                *v = Complex::new(0.0, 0.0);
            }
            for i in 0..SEGMENT_LEN {
                fft_buf[i] = Complex::new(extended[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut fft_buf);
            for (k, bin) in fft_buf.iter().take(N_FREQS).enumerate() {
                out[[k, frame]] = bin.norm() * self.scale;
            }
        }

        out
    }
}

impl Default for Spectrogram {
    fn default() -> Self {
        Self::new()
    }
}

fn periodic_hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let phase = 2.0 * std::f64::consts::PI * n as f64 / len as f64;
            (0.5 - 0.5 * phase.cos()) as f32
        })
        .collect()
}
