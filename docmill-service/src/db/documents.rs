//! Document repository operations.
//!
//! Includes the atomic dual-status transitions that move a document and its
//! active work items together. A crash between two separate status writes
//! was the original source of stuck items; doing both inside one rusqlite
//! transaction leaves the reconciliation sweeper as a crash-recovery net
//! rather than the primary consistency mechanism.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Document, DocumentStatus};
use crate::error::{DatabaseError, ServiceResult};

const DOCUMENT_COLUMNS: &str = "id, file_name, storage_locator, file_type, size_bytes, \
     content_hash, extracted_text, summary, category, status, status_label, retry_count, \
     error_message, analysis, started_at, completed_at, deleted, created_at, updated_at";

impl Database {
    /// Insert a new document
    pub fn insert_document(&self, doc: &Document) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();

        let analysis_json = doc
            .analysis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(DatabaseError::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO documents (id, file_name, storage_locator, file_type, size_bytes, content_hash,
                extracted_text, summary, category, status, status_label, retry_count, error_message,
                analysis, started_at, completed_at, deleted, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                doc.id,
                doc.file_name,
                doc.storage_locator,
                doc.file_type.as_str(),
                doc.size_bytes as i64,
                doc.content_hash,
                doc.extracted_text,
                doc.summary,
                doc.category,
                doc.status.as_str(),
                doc.status_label,
                doc.retry_count as i64,
                doc.error_message,
                analysis_json,
                doc.started_at.map(|t| t.to_rfc3339()),
                doc.completed_at.map(|t| t.to_rfc3339()),
                doc.deleted,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// List documents, newest first, excluding soft-deleted ones
    pub fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE deleted = 0 ORDER BY created_at DESC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map([], Document::from_row)
            .map_err(DatabaseError::Query)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(docs)
    }

    /// Get documents in a given status
    pub fn get_documents_by_status(&self, status: DocumentStatus) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE status = ?1 AND deleted = 0 ORDER BY created_at"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![status.as_str()], Document::from_row)
            .map_err(DatabaseError::Query)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(docs)
    }

    /// Find a live document with the given content hash (upload dedupe)
    pub fn get_document_by_hash(&self, content_hash: &str) -> ServiceResult<Option<String>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT id FROM documents WHERE content_hash = ?1 AND deleted = 0 AND status != 'failed'",
            params![content_hash],
            |row| row.get(0),
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Set a document's status and free-text label
    pub fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        label: Option<&str>,
    ) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET status = ?1, status_label = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), label, Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Soft-delete a document. The row is never physically removed on failure;
    /// only an explicit user action flips this flag.
    pub fn soft_delete_document(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE documents SET deleted = 1, updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Claim a work item and mark its document as processing, atomically.
    ///
    /// The claim only succeeds if the work item is still pending/retrying and
    /// no other work item for the same document is already in progress.
    /// Returns false if the claim was lost.
    pub fn begin_processing(
        &self,
        document_id: &str,
        work_item_id: &str,
        processor: &str,
    ) -> ServiceResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;
        let now = Utc::now().to_rfc3339();

        let claimed = tx
            .execute(
                r#"
                UPDATE work_items SET status = 'in_progress', processor = ?1, started_at = ?2
                WHERE id = ?3
                  AND status IN ('pending', 'retrying')
                  AND NOT EXISTS (
                      SELECT 1 FROM work_items
                      WHERE document_id = ?4 AND status = 'in_progress'
                  )
                "#,
                params![processor, now, work_item_id, document_id],
            )
            .map_err(DatabaseError::Query)?;

        if claimed == 0 {
            // Another worker holds the claim, or the item was cancelled
            return Ok(false);
        }

        tx.execute(
            r#"
            UPDATE documents
            SET status = 'processing', status_label = 'Processing',
                started_at = COALESCE(started_at, ?1), error_message = NULL, updated_at = ?1
            WHERE id = ?2
            "#,
            params![now, document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(true)
    }

    /// Terminal success transition: write results, mark the document
    /// processed, and close every still-active work item for it, in one
    /// transaction.
    pub fn complete_document(
        &self,
        document_id: &str,
        extracted_text: &str,
        summary: Option<&str>,
        category: Option<&str>,
        analysis: Option<&serde_json::Value>,
    ) -> ServiceResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;
        let now = Utc::now().to_rfc3339();

        let analysis_json = analysis
            .map(serde_json::to_string)
            .transpose()
            .map_err(DatabaseError::Serialization)?;

        tx.execute(
            r#"
            UPDATE documents
            SET status = 'processed', status_label = 'Processed',
                extracted_text = ?1, summary = ?2, category = ?3, analysis = ?4,
                error_message = NULL, completed_at = ?5,
                started_at = COALESCE(started_at, ?5), updated_at = ?5
            WHERE id = ?6
            "#,
            params![extracted_text, summary, category, analysis_json, now, document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.execute(
            r#"
            UPDATE work_items SET status = 'completed', completed_at = ?1
            WHERE document_id = ?2 AND status IN ('pending', 'in_progress', 'retrying')
            "#,
            params![now, document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Terminal failure transition: mark the document failed, bump its retry
    /// count, and close every still-active work item for it, in one
    /// transaction.
    pub fn fail_document(&self, document_id: &str, error: &str) -> ServiceResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(DatabaseError::Query)?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            r#"
            UPDATE documents
            SET status = 'failed', status_label = 'Failed', error_message = ?1,
                retry_count = retry_count + 1, completed_at = ?2,
                started_at = COALESCE(started_at, ?2), updated_at = ?2
            WHERE id = ?3
            "#,
            params![error, now, document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.execute(
            r#"
            UPDATE work_items SET status = 'failed', error_message = ?1, completed_at = ?2
            WHERE document_id = ?3 AND status IN ('pending', 'in_progress', 'retrying')
            "#,
            params![error, now, document_id],
        )
        .map_err(DatabaseError::Query)?;

        tx.commit().map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Documents stuck in processing whose last update is older than the
    /// given cutoff. Used by the reconciliation sweeper.
    pub fn get_stale_processing_documents(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents \
                 WHERE status = 'processing' AND updated_at < ?1"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![cutoff.to_rfc3339()], Document::from_row)
            .map_err(DatabaseError::Query)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(docs)
    }
}
