//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! The window pipeline is fixed to 16 kHz mono by design, but capture devices
//! commonly run at 44.1 or 48 kHz. `RateConverter` bridges that gap on the
//! capture-context thread, where allocation is allowed. When the device
//! already captures at the target rate no rubato session is created and
//! `process` is a plain copy.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{HarkError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input blocks between calls.
    pending: Vec<f32>,
    /// Input samples rubato expects per process call.
    block_len: usize,
    /// Pre-allocated rubato output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `HarkError::AudioDevice` if rubato fails to initialise.
    pub fn new(capture_rate: u32, target_rate: u32, block_len: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                block_len,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            block_len,
            1, // mono
        )
        .map_err(|e| HarkError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        tracing::info!(capture_rate, target_rate, block_len, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::new(),
            block_len,
            output_buf: vec![vec![0f32; max_out]],
        })
    }

    /// Feed captured samples, returning any resampled output (may be empty
    /// while a partial block accumulates). Passthrough mode copies directly.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.pending.len() >= self.block_len {
            let block = &self.pending[..self.block_len];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.pending.drain(..self.block_len);
        }
        result
    }

    /// `true` when capture rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
