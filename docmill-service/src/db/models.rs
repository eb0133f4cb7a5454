//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::extraction::FileType;

/// Processing status for documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded but not yet scheduled
    Uploaded,
    /// Work item created and queued
    Queued,
    /// A worker is running the pipeline for this document
    Processing,
    /// Pipeline finished and results were written
    Processed,
    /// Pipeline failed; error_message carries the reason
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "uploaded" => DocumentStatus::Uploaded,
            "queued" => DocumentStatus::Queued,
            "processing" => DocumentStatus::Processing,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Processed,
        }
    }

    /// Terminal statuses; once here, no active work item may remain.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Processed | DocumentStatus::Failed)
    }
}

/// Status of a scheduled unit of processing work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::InProgress => "in_progress",
            WorkItemStatus::Completed => "completed",
            WorkItemStatus::Failed => "failed",
            WorkItemStatus::Retrying => "retrying",
            WorkItemStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => WorkItemStatus::Pending,
            "in_progress" => WorkItemStatus::InProgress,
            "failed" => WorkItemStatus::Failed,
            "retrying" => WorkItemStatus::Retrying,
            "cancelled" => WorkItemStatus::Cancelled,
            _ => WorkItemStatus::Completed,
        }
    }

    /// Statuses that still hold a claim on future or current work.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WorkItemStatus::Pending | WorkItemStatus::InProgress | WorkItemStatus::Retrying
        )
    }
}

/// Kind of work scheduled for a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// Extract, classify, and summarize
    FullPipeline,
    /// Full pipeline plus entity extraction and intent detection
    Custom,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::FullPipeline => "full_pipeline",
            WorkKind::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "custom" => WorkKind::Custom,
            _ => WorkKind::FullPipeline,
        }
    }
}

/// Queue-serving priority tier. Higher tiers are always served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_u8(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Priority::Low,
            2 => Priority::High,
            3 => Priority::Critical,
            _ => Priority::Normal,
        }
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_name: String,
    /// Opaque reference handed to the storage backend
    pub storage_locator: Option<String>,
    pub file_type: FileType,
    pub size_bytes: u64,
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: DocumentStatus,
    /// Free-text status label shown to users (e.g. "Summarizing")
    pub status_label: Option<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Analysis sidecar (entities, intent) as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let file_type_str: String = row.get(3)?;
        let size_bytes: i64 = row.get(4)?;
        let status_str: String = row.get(9)?;
        let retry_count: i64 = row.get(11)?;
        let analysis_str: Option<String> = row.get(13)?;
        let started_at_str: Option<String> = row.get(14)?;
        let completed_at_str: Option<String> = row.get(15)?;
        let created_at_str: String = row.get(17)?;
        let updated_at_str: String = row.get(18)?;

        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            storage_locator: row.get(2)?,
            file_type: FileType::from_str(&file_type_str),
            size_bytes: size_bytes as u64,
            content_hash: row.get(5)?,
            extracted_text: row.get(6)?,
            summary: row.get(7)?,
            category: row.get(8)?,
            status: DocumentStatus::from_str(&status_str),
            status_label: row.get(10)?,
            retry_count: retry_count as u32,
            error_message: row.get(12)?,
            analysis: analysis_str.and_then(|s| serde_json::from_str(&s).ok()),
            started_at: started_at_str.as_deref().and_then(parse_timestamp),
            completed_at: completed_at_str.as_deref().and_then(parse_timestamp),
            deleted: row.get(16)?,
            created_at: parse_timestamp(&created_at_str).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at_str).unwrap_or_else(Utc::now),
        })
    }
}

/// Work item record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub document_id: String,
    pub kind: WorkKind,
    pub status: WorkItemStatus,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Identity of the worker that claimed this item
    pub processor: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let kind_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let priority_u8: u8 = row.get(4)?;
        let retry_count: i64 = row.get(5)?;
        let max_retries: i64 = row.get(6)?;
        let started_at_str: Option<String> = row.get(8)?;
        let completed_at_str: Option<String> = row.get(9)?;
        let next_retry_at_str: Option<String> = row.get(11)?;
        let created_at_str: String = row.get(12)?;

        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            kind: WorkKind::from_str(&kind_str),
            status: WorkItemStatus::from_str(&status_str),
            priority: Priority::from_u8(priority_u8),
            retry_count: retry_count as u32,
            max_retries: max_retries as u32,
            processor: row.get(7)?,
            started_at: started_at_str.as_deref().and_then(parse_timestamp),
            completed_at: completed_at_str.as_deref().and_then(parse_timestamp),
            error_message: row.get(10)?,
            next_retry_at: next_retry_at_str.as_deref().and_then(parse_timestamp),
            created_at: parse_timestamp(&created_at_str).unwrap_or_else(Utc::now),
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
