//! ONNX Runtime backend via the `ort` crate.
//!
//! Expects a speech-commands model exported to ONNX with a single input of
//! shape `[1, F, T, 1]` (the magnitude spectrogram, f32) and a single output
//! of shape `[1, 8]` — one probability per entry of
//! [`COMMANDS`](crate::inference::COMMANDS), in training order.

use std::path::{Path, PathBuf};

use ndarray::Array4;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::info;

use crate::error::{HarkError, Result};
use crate::features::stft::{n_frames, N_FREQS};
use crate::inference::Classifier;

pub struct OnnxClassifierConfig {
    pub model_path: PathBuf,
}

impl Default for OnnxClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
        }
    }
}

/// Platform default location for the command model.
pub fn default_model_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("HARK_MODEL_PATH") {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    default_models_dir().join("commands.onnx")
}

fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("Hark").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("hark")
            .join("models")
    }
}

fn create_session(model_path: &Path) -> Result<Session> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, 8);

    SessionBuilder::new()
        .map_err(|e| HarkError::OnnxSession(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| HarkError::OnnxSession(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| HarkError::OnnxSession(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| HarkError::OnnxSession(e.to_string()))
}

/// Command classifier backed by an ONNX Runtime session.
pub struct OnnxClassifier {
    config: OnnxClassifierConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn new(config: OnnxClassifierConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: String::new(),
            output_name: String::new(),
        }
    }
}

impl Classifier for OnnxClassifier {
    fn warm_up(&mut self) -> Result<()> {
        let path = &self.config.model_path;
        if !path.exists() {
            return Err(HarkError::ModelNotFound { path: path.clone() });
        }

        info!("loading command model from {:?}", path);
        let session = create_session(path)?;

        self.input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| HarkError::OnnxSession("model declares no inputs".into()))?;
        self.output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| HarkError::OnnxSession("model declares no outputs".into()))?;
        info!(
            input = %self.input_name,
            output = %self.output_name,
            "ONNX session ready"
        );
        self.session = Some(session);

        // Dummy forward pass at the canonical feature shape to populate
        // execution-provider caches.
        let dummy = Array4::<f32>::zeros((1, N_FREQS, n_frames(16_000), 1));
        self.infer(&dummy)?;
        info!("command model warm-up complete");
        Ok(())
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let Some(session) = self.session.as_mut() else {
            return Err(HarkError::OnnxSession(
                "model not loaded — call warm_up()".into(),
            ));
        };

        let value = Value::from_array(input.clone())
            .map_err(|e: ort::Error| HarkError::OnnxSession(e.to_string()))?;
        let inputs: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), SessionInputValue::from(value))];
        let outputs = session
            .run(inputs)
            .map_err(|e| HarkError::OnnxSession(e.to_string()))?;

        let (_, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| HarkError::OnnxSession(e.to_string()))?;
        Ok(data.to_vec())
    }
}
