//! Classifier abstraction and adapter.
//!
//! The `Classifier` trait decouples the pipeline from any specific backend
//! (stub, ONNX Runtime, …). The backend is opaque: it receives a fixed-shape
//! f32 tensor and returns a probability vector over the command classes.
//!
//! `&mut self` on `infer` intentionally expresses that interpreters may be
//! stateful (arena allocators, execution-provider caches). All mutation is
//! serialised through `ClassifierHandle`'s `parking_lot::Mutex`.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, OnnxClassifierConfig};

use std::sync::Arc;

use ndarray::{Array2, Array4};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{HarkError, Result};

/// Command label table. Positional — must match the classifier's
/// training-time label order exactly; no reordering permitted.
pub const COMMANDS: [&str; 8] = ["up", "no", "stop", "left", "right", "go", "down", "yes"];

/// Contract for classification backends.
pub trait Classifier: Send + 'static {
    /// One-time warm-up: load weights, allocate tensors, run a dummy
    /// inference. Called once at engine startup.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Run the model on a `(1, F, T, 1)` f32 tensor and return the raw
    /// probability vector, one entry per class in [`COMMANDS`] order.
    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

/// Thread-safe reference-counted handle to any `Classifier` implementor.
///
/// `parking_lot::Mutex` over std for non-poisoning on panic and a faster
/// uncontended path.
#[derive(Clone)]
pub struct ClassifierHandle(pub Arc<Mutex<dyn Classifier>>);

impl ClassifierHandle {
    pub fn new<C: Classifier>(classifier: C) -> Self {
        Self(Arc::new(Mutex::new(classifier)))
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle").finish_non_exhaustive()
    }
}

/// Result of one successful classification. Transient — produced per window,
/// never persisted.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Winning class index into [`COMMANDS`].
    pub index: usize,
    /// Winning label, lowercase.
    pub label: &'static str,
    /// Full probability vector as returned by the backend.
    pub scores: Vec<f32>,
}

impl Classification {
    /// Uppercased label for console display.
    pub fn display_label(&self) -> String {
        self.label.to_uppercase()
    }
}

/// Reshape a feature matrix to the model's `(1, F, T, 1)` tensor, invoke the
/// classifier, and select the top-scoring label.
///
/// The reshape is validated: an element-count mismatch fails loudly rather
/// than truncating or padding, and a score vector of the wrong length is
/// rejected before argmax.
pub fn classify(features: &Array2<f32>, handle: &ClassifierHandle) -> Result<Classification> {
    let (rows, cols) = features.dim();
    let expected = rows * cols;
    let tensor: Array4<f32> = features
        .to_owned()
        .into_shape_with_order((1, rows, cols, 1))
        .map_err(|_| HarkError::ShapeMismatch {
            expected,
            actual: features.len(),
        })?;

    let scores = handle.0.lock().infer(&tensor)?;
    if scores.len() != COMMANDS.len() {
        return Err(HarkError::ScoreVectorLength {
            expected: COMMANDS.len(),
            actual: scores.len(),
        });
    }

    let index = argmax(&scores);
    debug!(label = COMMANDS[index], score = scores[index], "classified window");
    Ok(Classification {
        index,
        label: COMMANDS[index],
        scores,
    })
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
