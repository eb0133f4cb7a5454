//! Typed inference results.
//!
//! Every operation on the inference client returns one of these instead of
//! an error: failures are carried as data (`error` note plus a degraded
//! payload) so one failed analysis never blocks the others.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification outcome for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    /// Per-category confidence, as reported by the model
    pub confidences: HashMap<String, f32>,
    pub tags: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationResult {
    pub fn failure(note: impl Into<String>, duration_ms: u64) -> Self {
        let note = note.into();
        Self {
            category: format!("Error: {note}"),
            confidences: HashMap::new(),
            tags: Vec::new(),
            duration_ms,
            error: Some(note),
        }
    }

    pub fn unparsed(note: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            category: "Unknown".to_string(),
            confidences: HashMap::new(),
            tags: Vec::new(),
            duration_ms,
            error: Some(note.into()),
        }
    }
}

/// Summarization outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummaryResult {
    pub fn failure(note: impl Into<String>, duration_ms: u64) -> Self {
        let note = note.into();
        Self {
            summary: format!("Summary unavailable: {note}"),
            key_points: Vec::new(),
            duration_ms,
            error: Some(note),
        }
    }
}

/// A single extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Entity extraction outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityExtractionResult {
    pub entities: Vec<Entity>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntityExtractionResult {
    pub fn failure(note: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            entities: Vec::new(),
            duration_ms,
            error: Some(note.into()),
        }
    }
}

/// Intent detection outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub primary_intent: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentResult {
    pub fn failure(note: impl Into<String>, duration_ms: u64) -> Self {
        let note = note.into();
        Self {
            primary_intent: "Unknown".to_string(),
            confidence: 0.0,
            suggested_action: None,
            duration_ms,
            error: Some(note),
        }
    }
}
