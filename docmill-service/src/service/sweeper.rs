//! Reconciliation sweeper.
//!
//! The pipeline keeps document and work-item status consistent in single
//! transactions; the sweeper is the crash-recovery net behind it. Each
//! pass closes work items orphaned by an already-terminal document, and
//! fails documents stuck in Processing past the staleness timeout (the
//! worker is presumed dead).

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::DocumentStatus;
use crate::error::ServiceResult;
use crate::service::DocmillService;

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Orphaned work items closed to match their document's terminal status
    pub items_repaired: usize,
    /// Stuck processing documents failed
    pub documents_failed: usize,
}

impl DocmillService {
    /// One reconciliation pass.
    pub fn run_sweep(&self) -> ServiceResult<SweepReport> {
        let mut report = SweepReport::default();

        for (item, doc_status) in self.db.get_orphaned_active_items()? {
            // The orphan query only joins against terminal documents
            if !doc_status.is_terminal() {
                continue;
            }
            let repaired = match doc_status {
                DocumentStatus::Processed => self.db.mark_work_item_completed(&item.id)?,
                DocumentStatus::Failed => self
                    .db
                    .mark_work_item_failed(&item.id, "closed by reconciliation: document failed")?,
                _ => false,
            };
            if repaired {
                warn!(
                    work_item_id = %item.id,
                    doc_id = %item.document_id,
                    doc_status = doc_status.as_str(),
                    "Repaired orphaned work item"
                );
                report.items_repaired += 1;
            }
        }

        let timeout = self.config.pipeline.stale_timeout();
        let cutoff = Utc::now()
            - ChronoDuration::from_std(timeout).unwrap_or_else(|_| ChronoDuration::seconds(0));
        for doc in self.db.get_stale_processing_documents(cutoff)? {
            warn!(
                doc_id = %doc.id,
                updated_at = %doc.updated_at,
                "Stuck document, failing it"
            );
            self.fail(
                &doc.id,
                &format!(
                    "stuck document: no progress for more than {}s, worker presumed dead",
                    timeout.as_secs()
                ),
            )?;
            report.documents_failed += 1;
        }

        if report != SweepReport::default() {
            info!(
                items_repaired = report.items_repaired,
                documents_failed = report.documents_failed,
                "Reconciliation sweep repaired state"
            );
        }
        Ok(report)
    }

    /// Start the periodic reconciliation task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = service.config.pipeline.sweep_interval();
        info!(period_secs = period.as_secs(), "Starting reconciliation sweeper");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick fires immediately; skip straight to the cadence
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = service.run_sweep() {
                    error!(error = %e, "Reconciliation sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Priority, WorkItemStatus, WorkKind};
    use crate::service::test_support::canned_service;

    #[tokio::test]
    async fn orphaned_items_converge_to_their_document_status() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "orphan.txt",
                b"will be left behind".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();
        let items = service.db.get_work_items_by_document(&doc.id).unwrap();

        // Simulate a crash that marked the document terminal while leaving
        // the work item pending
        service
            .db
            .execute_raw(&format!(
                "UPDATE documents SET status = 'processed' WHERE id = '{}';",
                doc.id
            ))
            .unwrap();

        let report = service.run_sweep().unwrap();
        assert_eq!(report.items_repaired, 1);
        assert_eq!(report.documents_failed, 0);

        let item = service.db.get_work_item(&items[0].id).unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Completed);

        // A second pass finds nothing to do
        assert_eq!(service.run_sweep().unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn orphans_of_a_failed_document_are_failed() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "crashed.txt",
                b"document failed mid-flight".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();
        let items = service.db.get_work_items_by_document(&doc.id).unwrap();

        service
            .db
            .execute_raw(&format!(
                "UPDATE documents SET status = 'failed' WHERE id = '{}';",
                doc.id
            ))
            .unwrap();

        service.run_sweep().unwrap();

        let item = service.db.get_work_item(&items[0].id).unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Failed);
        assert!(
            item.error_message
                .unwrap()
                .contains("closed by reconciliation")
        );
    }

    #[tokio::test]
    async fn stale_processing_document_is_failed_after_the_timeout() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "stuck.txt",
                b"worker died holding this".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();

        // Backdate a processing document past the staleness timeout
        let stale = (Utc::now()
            - ChronoDuration::seconds(service.config.pipeline.stale_timeout_secs as i64 + 60))
        .to_rfc3339();
        service
            .db
            .execute_raw(&format!(
                "UPDATE documents SET status = 'processing', updated_at = '{stale}' WHERE id = '{}';",
                doc.id
            ))
            .unwrap();

        let report = service.run_sweep().unwrap();
        assert_eq!(report.documents_failed, 1);

        let doc = service.db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc.error_message.unwrap().contains("stuck document"));
        // The pending work item was closed by the same failure transition
        for item in service.db.get_work_items_by_document(&doc.id).unwrap() {
            assert_eq!(item.status, WorkItemStatus::Failed);
        }
    }

    #[tokio::test]
    async fn fresh_processing_document_is_left_alone() {
        let service = canned_service();
        let doc = service
            .upload_document(
                "busy.txt",
                b"actively being worked".to_vec(),
                Priority::Normal,
                WorkKind::FullPipeline,
            )
            .await
            .unwrap();

        service
            .db
            .execute_raw(&format!(
                "UPDATE documents SET status = 'processing' WHERE id = '{}';",
                doc.id
            ))
            .unwrap();

        let report = service.run_sweep().unwrap();
        assert_eq!(report.documents_failed, 0);

        let doc = service.db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
    }
}
