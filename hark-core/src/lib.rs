//! # hark-core
//!
//! Reusable spoken-command detection engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → capture loop (spawn_blocking)
//!                                                    │
//!                                     resample → i16 → WindowAssembler
//!                                                    │
//!                                      bounded queue of analysis windows
//!                                                    │
//!                                    inference loop (spawn_blocking)
//!                                                    │
//!                               gate → features → Classifier::infer
//!                                                    │
//!                                 broadcast::Sender<DetectionEvent>
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on the capture and
//! inference threads.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod gate;
pub mod inference;
pub mod oneshot;

// Convenience re-exports for downstream crates
pub use engine::{EngineConfig, HarkEngine};
pub use error::HarkError;
pub use events::{DetectionEvent, EngineStatus, EngineStatusEvent};
pub use features::FeatureConfig;
pub use inference::{Classification, Classifier, ClassifierHandle, COMMANDS};
pub use oneshot::{classify_wav, FileOutcome};

#[cfg(feature = "onnx")]
pub use inference::{OnnxClassifier, OnnxClassifierConfig};
