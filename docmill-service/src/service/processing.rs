//! Pipeline state machine, run once per claimed work item.
//!
//! Claim, read, extract, analyze, persist. Inference failures are data on
//! the results and never fail the document; only storage reads and
//! persistence errors do.

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{DocumentStatus, WorkKind};
use crate::error::{ServiceError, ServiceResult};
use crate::service::DocmillService;

impl DocmillService {
    /// Run the pipeline for one work item.
    ///
    /// Losing the claim (another item for the document is already in
    /// progress, or the item was cancelled) is a normal outcome, not an
    /// error.
    pub async fn process_work_item(&self, work_item_id: &str) -> ServiceResult<()> {
        let item =
            self.db
                .get_work_item(work_item_id)?
                .ok_or_else(|| ServiceError::WorkItemNotFound {
                    work_item_id: work_item_id.to_string(),
                })?;

        // Guard before entering Processing: a missing or soft-deleted
        // document fails the item, not the pipeline.
        let document = match self.db.get_document(&item.document_id)? {
            Some(doc) if !doc.deleted => doc,
            _ => {
                warn!(
                    work_item_id,
                    doc_id = %item.document_id,
                    "Work item references a missing or deleted document"
                );
                self.db
                    .mark_work_item_failed(work_item_id, "document missing")?;
                return Ok(());
            }
        };

        let processor = format!("docmill-worker-{}", &Uuid::new_v4().to_string()[..8]);
        if !self
            .db
            .begin_processing(&document.id, work_item_id, &processor)?
        {
            debug!(work_item_id, doc_id = %document.id, "Claim lost, skipping");
            return Ok(());
        }
        self.notifier
            .publish(&document.id, DocumentStatus::Processing, None);
        info!(doc_id = %document.id, work_item_id, processor = %processor, "Processing started");

        let locator = match document.storage_locator.as_deref() {
            Some(locator) => locator,
            None => {
                self.fail(&document.id, "document has no stored content")?;
                return Ok(());
            }
        };
        let bytes = match self.storage.read(locator).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(doc_id = %document.id, error = %e, "Storage read failed");
                self.fail(&document.id, &format!("storage read failed: {e}"))?;
                return Ok(());
            }
        };

        // Extraction never fails; a degraded result still flows through
        let content = self.extractor.extract(&document.file_type, &bytes);
        debug!(
            doc_id = %document.id,
            chars = content.text.chars().count(),
            truncated = content.truncated,
            tables = content.tables.len(),
            "Content extracted"
        );

        // Each concurrent consumer gets its own copy of the text
        let (classification, summary, analysis_extras) = match item.kind {
            WorkKind::FullPipeline => {
                let (classification, summary) = tokio::join!(
                    self.inference
                        .classify(&content.text, &document.file_name, &document.id),
                    self.inference
                        .summarize(&content.text, &document.file_name, &document.id),
                );
                (classification, summary, None)
            }
            WorkKind::Custom => {
                let (classification, summary, entities, intent) = tokio::join!(
                    self.inference
                        .classify(&content.text, &document.file_name, &document.id),
                    self.inference
                        .summarize(&content.text, &document.file_name, &document.id),
                    self.inference
                        .extract_entities(&content.text, &document.file_name, &document.id),
                    self.inference
                        .detect_intent(&content.text, &document.file_name, &document.id),
                );
                (classification, summary, Some((entities, intent)))
            }
        };

        let mut analysis = json!({
            "classification": classification,
            "summary_key_points": summary.key_points,
            "extraction": {
                "truncated": content.truncated,
                "metadata": content.metadata,
                "tables": content.tables,
            },
        });
        if let Some((entities, intent)) = analysis_extras {
            analysis["entities"] = json!(entities);
            analysis["intent"] = json!(intent);
        }

        if let Err(e) = self.db.complete_document(
            &document.id,
            &content.text,
            Some(&summary.summary),
            Some(&classification.category),
            Some(&analysis),
        ) {
            warn!(doc_id = %document.id, error = %e, "Failed to persist pipeline results");
            self.fail(&document.id, &format!("failed to persist results: {e}"))?;
            return Ok(());
        }

        self.notifier
            .publish(&document.id, DocumentStatus::Processed, None);
        info!(
            doc_id = %document.id,
            category = %classification.category,
            "Processing finished"
        );
        Ok(())
    }

    /// Terminal failure: document and all active work items, one transaction.
    pub(super) fn fail(&self, document_id: &str, message: &str) -> ServiceResult<()> {
        self.db.fail_document(document_id, message)?;
        self.notifier.publish(
            document_id,
            DocumentStatus::Failed,
            Some(message.to_string()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Priority, WorkItemStatus};
    use crate::extraction::{TRUNCATION_LIMIT, TRUNCATION_MARKER};
    use crate::inference::{InferenceProvider, MockProvider};
    use crate::service::test_support::{canned_service, service_with_mock};

    async fn upload_and_process(
        service: &std::sync::Arc<DocmillService>,
        file_name: &str,
        bytes: Vec<u8>,
        kind: WorkKind,
    ) -> crate::db::Document {
        let doc = service
            .upload_document(file_name, bytes, Priority::Normal, kind)
            .await
            .unwrap();
        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        service.process_work_item(&items[0].id).await.unwrap();
        service.db.get_document(&doc.id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn full_pipeline_processes_a_text_document() {
        let service = canned_service();
        let doc = upload_and_process(
            &service,
            "notes.txt",
            b"meeting notes from tuesday".to_vec(),
            WorkKind::FullPipeline,
        )
        .await;

        assert_eq!(doc.status, DocumentStatus::Processed);
        assert_eq!(doc.category.as_deref(), Some("Report"));
        assert_eq!(
            doc.summary.as_deref(),
            Some("A concise mock summary of the document.")
        );
        assert!(doc.extracted_text.unwrap().contains("meeting notes"));
        assert!(doc.started_at.is_some());
        assert!(doc.completed_at.is_some());

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        assert_eq!(items[0].status, WorkItemStatus::Completed);
        assert!(items[0].processor.is_some());
    }

    #[tokio::test]
    async fn custom_kind_records_entities_and_intent() {
        let service = canned_service();
        let doc = upload_and_process(
            &service,
            "contract.txt",
            b"agreement between parties".to_vec(),
            WorkKind::Custom,
        )
        .await;

        assert_eq!(doc.status, DocumentStatus::Processed);
        let analysis = doc.analysis.unwrap();
        assert_eq!(analysis["entities"]["entities"][0]["value"], "Acme Corp");
        assert_eq!(analysis["intent"]["primary_intent"], "informational");
    }

    #[tokio::test]
    async fn inference_failure_degrades_results_without_failing_document() {
        // First call (classify) fails hard; the scripted queue is then
        // exhausted so summarize falls back to the canned response.
        let service = service_with_mock(MockProvider::scripted(vec![Err(
            crate::error::InferenceError::AccessDenied,
        )]));

        let doc = upload_and_process(
            &service,
            "doc.txt",
            b"some content".to_vec(),
            WorkKind::FullPipeline,
        )
        .await;

        assert_eq!(doc.status, DocumentStatus::Processed);
        assert!(doc.category.unwrap().starts_with("Error:"));
        assert_eq!(
            doc.summary.as_deref(),
            Some("A concise mock summary of the document.")
        );
    }

    #[tokio::test]
    async fn soft_deleted_document_fails_the_work_item_only() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "gone.txt",
                b"deleted before processing".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();
        service.db.soft_delete_document(&doc.id).unwrap();

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        service.process_work_item(&items[0].id).await.unwrap();

        let item = service.db.get_work_item(&items[0].id).unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Failed);
        assert_eq!(item.error_message.as_deref(), Some("document missing"));
    }

    #[tokio::test]
    async fn successful_processing_closes_all_sibling_work_items() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "twice.txt",
                b"submitted twice".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();
        // A re-submission adds a second pending item for the same document
        let second = service
            .schedule_work(&doc.id, WorkKind::FullPipeline, Priority::High)
            .unwrap();

        let items = service.db.get_work_items_by_document(&doc.id).unwrap();
        assert_eq!(items.len(), 2);
        service.process_work_item(&second.id).await.unwrap();

        for item in service.db.get_work_items_by_document(&doc.id).unwrap() {
            assert_eq!(item.status, WorkItemStatus::Completed);
        }
        let doc = service.db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Processed);
    }

    #[tokio::test]
    async fn oversized_text_is_truncated_before_the_classification_prompt() {
        let service = canned_service();
        let body: String = "x".repeat(98_005);

        let doc = upload_and_process(
            &service,
            "big.txt",
            body.into_bytes(),
            WorkKind::FullPipeline,
        )
        .await;

        assert_eq!(doc.status, DocumentStatus::Processed);
        let text = doc.extracted_text.unwrap();
        assert_eq!(
            text.chars().count(),
            TRUNCATION_LIMIT + TRUNCATION_MARKER.chars().count()
        );
        assert!(text.ends_with(TRUNCATION_MARKER));

        let prompts = match service.inference.provider() {
            InferenceProvider::Mock(mock) => mock.seen_prompts(),
            InferenceProvider::Http(_) => panic!("expected mock provider"),
        };
        let classify_prompt = prompts
            .iter()
            .find(|p| p.starts_with("Classify"))
            .expect("classification prompt was issued");
        assert!(classify_prompt.contains(TRUNCATION_MARKER));
    }
}
