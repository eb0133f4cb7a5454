//! Document intake: upload, dedupe, and work scheduling.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{Document, DocumentStatus, Priority, WorkItem, WorkItemStatus, WorkKind};
use crate::error::{ServiceError, ServiceResult};
use crate::extraction::FileType;
use crate::queue::Job;
use crate::service::DocmillService;

/// Upper bound on work items re-enqueued at startup
const RESUME_BATCH: usize = 1_000;

impl DocmillService {
    /// Accept an uploaded file: validate, dedupe by content hash, persist
    /// the bytes and the document record, and schedule pipeline work.
    ///
    /// A re-upload of identical content returns the existing document
    /// without scheduling new work.
    pub async fn upload_document(
        self: &Arc<Self>,
        file_name: &str,
        bytes: Vec<u8>,
        priority: Priority,
        kind: WorkKind,
    ) -> ServiceResult<Document> {
        if file_name.trim().is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "File name must not be empty".to_string(),
            });
        }
        if bytes.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Uploaded file is empty".to_string(),
            });
        }
        let max_size = self.config.pipeline.max_document_size_bytes;
        if bytes.len() as u64 > max_size {
            return Err(ServiceError::InvalidRequest {
                message: format!(
                    "File exceeds the {max_size}-byte upload limit ({} bytes)",
                    bytes.len()
                ),
            });
        }

        let content_hash = hash_content(&bytes);
        if let Some(existing_id) = self.db.get_document_by_hash(&content_hash)? {
            if let Some(existing) = self.db.get_document(&existing_id)? {
                info!(doc_id = %existing.id, file_name, "Duplicate upload, returning existing document");
                return Ok(existing);
            }
        }

        let locator = self.storage.write(&bytes, file_name).await?;
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            storage_locator: Some(locator),
            file_type: FileType::from_file_name(file_name),
            size_bytes: bytes.len() as u64,
            content_hash: Some(content_hash),
            extracted_text: None,
            summary: None,
            category: None,
            status: DocumentStatus::Uploaded,
            status_label: Some("Uploaded".to_string()),
            retry_count: 0,
            error_message: None,
            analysis: None,
            started_at: None,
            completed_at: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_document(&document)?;
        info!(doc_id = %document.id, file_name, size = document.size_bytes, "Document uploaded");

        self.schedule_work(&document.id, kind, priority)?;

        self.db
            .get_document(&document.id)?
            .ok_or(ServiceError::DocumentNotFound {
                document_id: document.id,
            })
    }

    /// Create a pending work item for a document and hand it to the queue.
    /// The document moves to Queued.
    pub fn schedule_work(
        self: &Arc<Self>,
        document_id: &str,
        kind: WorkKind,
        priority: Priority,
    ) -> ServiceResult<WorkItem> {
        let work_item = WorkItem {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            kind,
            status: WorkItemStatus::Pending,
            priority,
            retry_count: 0,
            max_retries: self.config.pipeline.work_item_max_retries,
            processor: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            next_retry_at: None,
            created_at: Utc::now(),
        };
        self.db.insert_work_item(&work_item)?;
        self.db
            .update_document_status(document_id, DocumentStatus::Queued, Some("Queued"))?;
        self.notifier
            .publish(document_id, DocumentStatus::Queued, None);

        let service = Arc::clone(self);
        let work_item_id = work_item.id.clone();
        let job: Job = Box::pin(async move { service.process_work_item(&work_item_id).await });
        self.queue.enqueue(work_item.id.clone(), priority, job);

        debug!(doc_id = %document_id, work_item_id = %work_item.id, ?priority, "Work scheduled");
        Ok(work_item)
    }

    /// Re-enqueue work items left pending or retrying by a previous run.
    /// Called once at startup; the claim step keeps a double enqueue
    /// harmless.
    pub fn resume_pending_work(self: &Arc<Self>) -> ServiceResult<usize> {
        let pending = self.db.get_pending_work_items(RESUME_BATCH)?;
        let count = pending.len();

        for item in pending {
            let service = Arc::clone(self);
            let work_item_id = item.id.clone();
            let job: Job = Box::pin(async move { service.process_work_item(&work_item_id).await });
            self.queue.enqueue(item.id, item.priority, job);
        }

        if count > 0 {
            info!(count, "Resumed pending work items");
        }
        Ok(count)
    }
}

fn hash_content(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobStatus;
    use crate::service::test_support::canned_service;

    #[tokio::test]
    async fn upload_creates_queued_document_and_work_item() {
        let service = canned_service();

        let doc = service
            .upload_document(
                "report.txt",
                b"quarterly report body".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();

        assert_eq!(doc.status, DocumentStatus::Queued);
        assert_eq!(doc.file_type, FileType::Text);
        assert!(doc.storage_locator.is_some());
        assert!(doc.content_hash.is_some());

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, WorkItemStatus::Pending);
        assert_eq!(
            service.queue.try_get_status(&items[0].id),
            Some(JobStatus::Queued)
        );
    }

    #[tokio::test]
    async fn identical_content_dedupes_to_existing_document() {
        let service = canned_service();
        let bytes = b"same bytes".to_vec();

        let first = service
            .upload_document("a.txt", bytes.clone(), Priority::Normal, WorkKind::FullPipeline)
            .await
            .unwrap();
        let second = service
            .upload_document("b.txt", bytes, Priority::High, WorkKind::FullPipeline)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(service.db.list_documents().unwrap().len(), 1);
        assert_eq!(
            service.db.get_work_items_by_document(&first.id).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn resume_requeues_items_left_pending() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "leftover.txt",
                b"survived a restart".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();

        let resumed = service.resume_pending_work().unwrap();
        assert_eq!(resumed, 1);

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        assert_eq!(
            service.queue.try_get_status(&items[0].id),
            Some(JobStatus::Queued)
        );
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let service = canned_service();

        let err = service
            .upload_document("empty.txt", Vec::new(), Priority::Normal, WorkKind::FullPipeline)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let service = canned_service();
        let limit = service.config.pipeline.max_document_size_bytes as usize;

        let err = service
            .upload_document(
                "huge.txt",
                vec![b'x'; limit + 1],
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }
}
