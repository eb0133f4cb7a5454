//! Content extraction: raw bytes plus a declared file type in, normalized
//! text plus metadata out.
//!
//! Extraction never fails the pipeline. Any internal error is converted into
//! placeholder text with the failure recorded in metadata, so downstream
//! inference runs with degraded information instead of aborting.

mod pdf;
mod tabular;
mod text;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Character ceiling applied to extracted text before inference, keeping
/// prompts within what the model can usefully attend to.
pub const TRUNCATION_LIMIT: usize = 50_000;

/// Appended verbatim whenever text is cut at the ceiling.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated due to length...]";

/// Declared file type of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Csv,
    Text,
    Other(String),
}

impl FileType {
    pub fn as_str(&self) -> &str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Csv => "csv",
            FileType::Text => "txt",
            FileType::Other(ext) => ext,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pdf" => FileType::Pdf,
            "csv" => FileType::Csv,
            "txt" | "text" => FileType::Text,
            other => FileType::Other(other.to_string()),
        }
    }

    /// Declared type from a file name's extension
    pub fn from_file_name(name: &str) -> Self {
        let ext = std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        Self::from_str(&ext)
    }
}

/// A table-like fragment detected during extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFragment {
    pub page: Option<u32>,
    pub rows: Vec<Vec<String>>,
}

/// Result of one extraction call. Ephemeral: consumed by the inference
/// client and discarded; only the normalized text is persisted.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub kind: FileType,
    pub metadata: HashMap<String, String>,
    pub truncated: bool,
    pub tables: Vec<TableFragment>,
}

impl ExtractedContent {
    fn placeholder(kind: FileType, message: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), message.to_string());
        Self {
            text: format!("[Extraction failed: {message}]"),
            kind,
            metadata,
            truncated: false,
            tables: Vec::new(),
        }
    }
}

/// Content extraction dispatcher
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract normalized text from raw bytes. Never returns an error;
    /// failures degrade to placeholder content.
    pub fn extract(&self, file_type: &FileType, bytes: &[u8]) -> ExtractedContent {
        let mut content = match file_type {
            FileType::Pdf => match pdf::extract(bytes, TRUNCATION_LIMIT) {
                Ok(extraction) => {
                    let mut metadata = HashMap::new();
                    metadata.insert("pages".to_string(), extraction.pages.to_string());
                    ExtractedContent {
                        text: extraction.text,
                        kind: FileType::Pdf,
                        metadata,
                        truncated: false,
                        tables: extraction.tables,
                    }
                }
                Err(message) => {
                    warn!(error = %message, "PDF extraction failed, continuing with placeholder");
                    ExtractedContent::placeholder(FileType::Pdf, &message)
                }
            },
            FileType::Csv => match tabular::extract(bytes) {
                Ok(extraction) => {
                    let mut metadata = HashMap::new();
                    metadata.insert("rows".to_string(), extraction.total_rows.to_string());
                    metadata.insert("columns".to_string(), extraction.total_columns.to_string());
                    ExtractedContent {
                        text: extraction.text,
                        kind: FileType::Csv,
                        metadata,
                        truncated: false,
                        tables: extraction.tables,
                    }
                }
                Err(message) => {
                    warn!(error = %message, "CSV extraction failed, continuing with placeholder");
                    ExtractedContent::placeholder(FileType::Csv, &message)
                }
            },
            FileType::Text => {
                let extraction = text::extract(bytes);
                ExtractedContent {
                    text: extraction.text,
                    kind: FileType::Text,
                    metadata: extraction.metadata,
                    truncated: false,
                    tables: Vec::new(),
                }
            }
            FileType::Other(ext) => {
                let mut metadata = HashMap::new();
                metadata.insert("unsupported_type".to_string(), ext.clone());
                ExtractedContent {
                    text: format!(
                        "[Unsupported file type: .{ext}. The file was stored but its content could not be extracted.]"
                    ),
                    kind: file_type.clone(),
                    metadata,
                    truncated: false,
                    tables: Vec::new(),
                }
            }
        };

        let (truncated_text, truncated) = apply_truncation(content.text);
        content.text = truncated_text;
        content.truncated = truncated;

        debug!(
            kind = %content.kind.as_str(),
            chars = content.text.chars().count(),
            truncated = content.truncated,
            tables = content.tables.len(),
            "Content extracted"
        );

        content
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform truncation, applied after per-type extraction regardless of
/// source type: cut to exactly `TRUNCATION_LIMIT` characters and append the
/// marker.
fn apply_truncation(text: String) -> (String, bool) {
    let char_count = text.chars().count();
    if char_count <= TRUNCATION_LIMIT {
        return (text, false);
    }

    let mut cut: String = text.chars().take(TRUNCATION_LIMIT).collect();
    cut.push_str(TRUNCATION_MARKER);
    (cut, true)
}
