//! Document management: lookup, listing, cancellation, reprocessing, and
//! soft deletion.

use std::sync::Arc;
use tracing::info;

use crate::db::{Document, DocumentStatus, Priority, WorkItem, WorkKind};
use crate::error::{ServiceError, ServiceResult};
use crate::service::DocmillService;

impl DocmillService {
    pub fn get_document(&self, document_id: &str) -> ServiceResult<Document> {
        self.db
            .get_document(document_id)?
            .filter(|doc| !doc.deleted)
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    pub fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        self.db.list_documents()
    }

    pub fn get_work_items(&self, document_id: &str) -> ServiceResult<Vec<WorkItem>> {
        // Surface a 404 for unknown documents rather than an empty list
        self.get_document(document_id)?;
        self.db.get_work_items_by_document(document_id)
    }

    /// Cancel all not-yet-claimed work for a document. In-flight work runs
    /// to completion. Returns the number of work items cancelled.
    pub fn cancel_document_work(&self, document_id: &str) -> ServiceResult<usize> {
        let document = self.get_document(document_id)?;

        let mut cancelled = 0;
        for item in self.db.get_work_items_by_document(document_id)? {
            // Queue removal first: a claimed entry refuses, and the db
            // cancel below only touches pending/retrying rows anyway
            self.queue.cancel(&item.id);
            if self.db.cancel_work_item(&item.id)? {
                cancelled += 1;
            }
        }

        if cancelled > 0 && document.status == DocumentStatus::Queued {
            self.db.update_document_status(
                document_id,
                DocumentStatus::Uploaded,
                Some("Cancelled"),
            )?;
            self.notifier
                .publish(document_id, DocumentStatus::Uploaded, None);
        }

        info!(doc_id = %document_id, cancelled, "Cancelled pending work");
        Ok(cancelled)
    }

    /// Schedule a fresh pipeline run for an existing document.
    pub fn reprocess_document(
        self: &Arc<Self>,
        document_id: &str,
        kind: WorkKind,
        priority: Priority,
    ) -> ServiceResult<WorkItem> {
        self.get_document(document_id)?;
        info!(doc_id = %document_id, ?priority, "Reprocessing requested");
        self.schedule_work(document_id, kind, priority)
    }

    /// Soft delete: the row stays, pending work is cancelled, stored bytes
    /// are removed.
    pub async fn delete_document(&self, document_id: &str) -> ServiceResult<()> {
        let document = self.get_document(document_id)?;

        for item in self.db.get_work_items_by_document(document_id)? {
            self.queue.cancel(&item.id);
            self.db.cancel_work_item(&item.id)?;
        }

        self.db.soft_delete_document(document_id)?;
        if let Some(locator) = document.storage_locator.as_deref() {
            self.storage.delete(locator).await?;
        }

        info!(doc_id = %document_id, "Document soft-deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::WorkItemStatus;
    use crate::queue::JobStatus;
    use crate::service::test_support::canned_service;

    #[tokio::test]
    async fn cancel_pending_work_resets_a_queued_document() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "pending.txt",
                b"waiting in line".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();

        let cancelled = service.cancel_document_work(&doc.id).unwrap();
        assert_eq!(cancelled, 1);

        let doc = service.get_document(&doc.id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert_eq!(doc.status_label.as_deref(), Some("Cancelled"));

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        assert_eq!(items[0].status, WorkItemStatus::Cancelled);
        assert_eq!(
            service.queue.try_get_status(&items[0].id),
            Some(JobStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn reprocess_adds_a_new_work_item() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "again.txt",
                b"process me again".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();

        let item = service
            .reprocess_document(&doc.id, WorkKind::Custom, Priority::Critical)
            .unwrap();
        assert_eq!(item.priority, Priority::Critical);
        assert_eq!(item.kind, WorkKind::Custom);

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn soft_delete_hides_document_and_drops_bytes() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "bye.txt",
                b"short-lived".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();
        let locator = doc.storage_locator.clone().unwrap();

        service.delete_document(&doc.id).await.unwrap();

        assert!(matches!(
            service.get_document(&doc.id),
            Err(ServiceError::DocumentNotFound { .. })
        ));
        assert!(service.list_documents().unwrap().is_empty());
        assert!(!service.storage.exists(&locator).await);

        // The row itself survives the soft delete
        let raw = service.db.get_document(&doc.id).unwrap().unwrap();
        assert!(raw.deleted);
    }

    #[tokio::test]
    async fn unknown_document_is_a_not_found_error() {
        let service = canned_service();
        assert!(matches!(
            service.get_document("no-such-id"),
            Err(ServiceError::DocumentNotFound { .. })
        ));
        assert!(matches!(
            service.cancel_document_work("no-such-id"),
            Err(ServiceError::DocumentNotFound { .. })
        ));
    }
}
