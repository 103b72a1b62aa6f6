//! Event types broadcast by the engine.
//!
//! Serialized with serde (camelCase) so front-ends can forward them over any
//! IPC boundary without re-mapping field names.

use serde::{Deserialize, Serialize};

/// Emitted whenever the pipeline classifies a non-silent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Winning command label, lowercase (e.g. `"left"`).
    pub label: String,
    /// Raw probability vector over all command classes, in label-table order.
    pub scores: Vec<f32>,
}

impl DetectionEvent {
    /// Display form of the label, as printed by the console front-end.
    pub fn display_label(&self) -> String {
        self.label.to_uppercase()
    }
}

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the hark engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Warming up the classifier (loading weights, dummy inference).
    WarmingUp,
    /// Actively capturing audio and classifying windows.
    Listening,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}
