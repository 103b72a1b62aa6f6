//! `StubClassifier` — deterministic backend without a real model.
//!
//! Used in tests and for exercising the full capture → pipeline path before
//! an ONNX model is available.

use ndarray::Array4;
use tracing::debug;

use crate::error::Result;
use crate::inference::{Classifier, COMMANDS};

/// Returns a fixed score vector on every call.
pub struct StubClassifier {
    scores: Vec<f32>,
    calls: u64,
}

impl StubClassifier {
    /// A stub whose probability mass favors `index`.
    pub fn favoring(index: usize) -> Self {
        assert!(index < COMMANDS.len());
        let mut scores = vec![0.1 / (COMMANDS.len() - 1) as f32; COMMANDS.len()];
        scores[index] = 0.9;
        Self { scores, calls: 0 }
    }

    /// A stub returning exactly `scores` — including deliberately malformed
    /// vectors for adapter validation tests.
    pub fn with_scores(scores: Vec<f32>) -> Self {
        Self { scores, calls: 0 }
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::favoring(0)
    }
}

impl Classifier for StubClassifier {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubClassifier::warm_up — no-op");
        Ok(())
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
        self.calls += 1;
        debug!(shape = ?input.dim(), call = self.calls, "StubClassifier::infer");
        Ok(self.scores.clone())
    }
}
