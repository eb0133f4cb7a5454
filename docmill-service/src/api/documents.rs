//! Document API endpoints.
//!
//! Upload (multipart), lookup, listing, status, cancellation, reprocess,
//! and soft delete.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{Document, Priority, WorkItem, WorkKind};
use crate::error::ServiceError;
use crate::extraction::FileType;
use crate::queue::JobStatus;

use super::AppState;

/// Response for delete and cancel operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled_work_items: usize,
}

/// Request body for reprocessing; both fields optional
#[derive(Default, Deserialize)]
pub struct ReprocessRequest {
    pub priority: Option<Priority>,
    pub kind: Option<WorkKind>,
}

/// Combined document + queue status view
#[derive(Serialize)]
pub struct DocumentStatusResponse {
    pub document_id: String,
    pub status: crate::db::DocumentStatus,
    pub status_label: Option<String>,
    pub error_message: Option<String>,
    pub work_items: Vec<WorkItemStatusView>,
}

#[derive(Serialize)]
pub struct WorkItemStatusView {
    pub id: String,
    pub status: crate::db::WorkItemStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_status: Option<JobStatus>,
}

/// List all documents, newest first
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Document>>, ServiceError> {
    Ok(Json(state.service.list_documents()?))
}

/// Upload a new document via multipart form.
///
/// Fields: `file` (required), `priority` (low|normal|high|critical),
/// `kind` (full_pipeline|custom).
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, ServiceError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut priority = Priority::Normal;
    let mut kind = WorkKind::FullPipeline;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidRequest {
            message: format!("Malformed multipart upload: {e}"),
        })?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::InvalidRequest {
                        message: e.to_string(),
                    })?;
                file = Some((file_name, data.to_vec()));
            }
            "priority" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::InvalidRequest {
                        message: e.to_string(),
                    })?;
                priority = parse_priority(&text)?;
            }
            "kind" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::InvalidRequest {
                        message: e.to_string(),
                    })?;
                kind = match text.as_str() {
                    "custom" => WorkKind::Custom,
                    _ => WorkKind::FullPipeline,
                };
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| ServiceError::InvalidRequest {
        message: "Missing 'file' field in multipart upload".to_string(),
    })?;

    let document = state
        .service
        .upload_document(&file_name, bytes, priority, kind)
        .await?;
    Ok(Json(document))
}

pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    Ok(Json(state.service.get_document(&id)?))
}

/// Download the originally uploaded bytes
pub async fn get_document_content_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let document = state.service.get_document(&id)?;
    let locator =
        document
            .storage_locator
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidRequest {
                message: "Document has no stored content".to_string(),
            })?;
    let data = state.service.storage.read(locator).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                content_type_for(&document.file_type).to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
        ],
        Bytes::from(data),
    ))
}

fn content_type_for(file_type: &FileType) -> mime::Mime {
    match file_type {
        FileType::Pdf => mime::APPLICATION_PDF,
        FileType::Csv => mime::TEXT_CSV,
        FileType::Text => mime::TEXT_PLAIN_UTF_8,
        FileType::Other(_) => mime::APPLICATION_OCTET_STREAM,
    }
}

pub async fn get_document_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentStatusResponse>, ServiceError> {
    let document = state.service.get_document(&id)?;
    let work_items = state
        .service
        .get_work_items(&id)?
        .into_iter()
        .map(|item| WorkItemStatusView {
            queue_status: state.service.queue.try_get_status(&item.id),
            id: item.id,
            status: item.status,
            priority: item.priority,
        })
        .collect();

    Ok(Json(DocumentStatusResponse {
        document_id: document.id,
        status: document.status,
        status_label: document.status_label,
        error_message: document.error_message,
        work_items,
    }))
}

pub async fn get_work_items_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<WorkItem>>, ServiceError> {
    Ok(Json(state.service.get_work_items(&id)?))
}

/// Cancel pending work. In-flight work is not preempted.
pub async fn cancel_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ServiceError> {
    let cancelled_work_items = state.service.cancel_document_work(&id)?;
    Ok(Json(CancelResponse {
        cancelled_work_items,
    }))
}

pub async fn reprocess_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ReprocessRequest>>,
) -> Result<Json<WorkItem>, ServiceError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let item = state.service.reprocess_document(
        &id,
        request.kind.unwrap_or(WorkKind::FullPipeline),
        request.priority.unwrap_or_default(),
    )?;
    Ok(Json(item))
}

pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    state.service.delete_document(&id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Document {id} deleted"),
    }))
}

fn parse_priority(s: &str) -> Result<Priority, ServiceError> {
    match s {
        "low" => Ok(Priority::Low),
        "normal" => Ok(Priority::Normal),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        other => Err(ServiceError::InvalidRequest {
            message: format!("Unknown priority '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parsing() {
        assert_eq!(parse_priority("critical").unwrap(), Priority::Critical);
        assert_eq!(parse_priority("normal").unwrap(), Priority::Normal);
        assert!(parse_priority("urgent").is_err());
    }

    #[test]
    fn content_types_match_file_types() {
        assert_eq!(content_type_for(&FileType::Pdf), mime::APPLICATION_PDF);
        assert_eq!(content_type_for(&FileType::Csv), mime::TEXT_CSV);
        assert_eq!(
            content_type_for(&FileType::Other("zip".to_string())),
            mime::APPLICATION_OCTET_STREAM
        );
    }
}
