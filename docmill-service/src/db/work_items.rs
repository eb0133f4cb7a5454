//! Work item repository operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{DocumentStatus, WorkItem};
use crate::error::{DatabaseError, ServiceResult};

const WORK_ITEM_COLUMNS: &str = "id, document_id, kind, status, priority, retry_count, \
     max_retries, processor, started_at, completed_at, error_message, next_retry_at, created_at";

impl Database {
    /// Insert a new work item
    pub fn insert_work_item(&self, item: &WorkItem) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO work_items (id, document_id, kind, status, priority, retry_count,
                max_retries, processor, started_at, completed_at, error_message, next_retry_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                item.id,
                item.document_id,
                item.kind.as_str(),
                item.status.as_str(),
                item.priority.as_u8(),
                item.retry_count as i64,
                item.max_retries as i64,
                item.processor,
                item.started_at.map(|t| t.to_rfc3339()),
                item.completed_at.map(|t| t.to_rfc3339()),
                item.error_message,
                item.next_retry_at.map(|t| t.to_rfc3339()),
                item.created_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a work item by ID
    pub fn get_work_item(&self, id: &str) -> ServiceResult<Option<WorkItem>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = ?1"),
            params![id],
            WorkItem::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// All work items for a document, newest first
    pub fn get_work_items_by_document(&self, document_id: &str) -> ServiceResult<Vec<WorkItem>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WORK_ITEM_COLUMNS} FROM work_items \
                 WHERE document_id = ?1 ORDER BY created_at DESC"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![document_id], WorkItem::from_row)
            .map_err(DatabaseError::Query)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(items)
    }

    /// Pending or retrying work items, highest priority first then oldest
    /// first. Used to resume work after a restart.
    pub fn get_pending_work_items(&self, limit: usize) -> ServiceResult<Vec<WorkItem>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WORK_ITEM_COLUMNS} FROM work_items \
                 WHERE status IN ('pending', 'retrying') \
                 ORDER BY priority DESC, created_at ASC LIMIT ?1"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![limit as i64], WorkItem::from_row)
            .map_err(DatabaseError::Query)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(items)
    }

    /// Mark a single work item completed
    pub fn mark_work_item_completed(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE work_items SET status = 'completed', completed_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Mark a single work item failed with an error note
    pub fn mark_work_item_failed(&self, id: &str, error: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE work_items SET status = 'failed', error_message = ?1, completed_at = ?2 WHERE id = ?3",
                params![error, Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Cancel a work item that has not been claimed yet.
    /// In-progress items are never cancelled; they run to completion.
    pub fn cancel_work_item(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE work_items SET status = 'cancelled', completed_at = ?1 \
                 WHERE id = ?2 AND status IN ('pending', 'retrying')",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Active work items whose document already reached a terminal status.
    /// These are the split-status leftovers the sweeper repairs.
    pub fn get_orphaned_active_items(&self) -> ServiceResult<Vec<(WorkItem, DocumentStatus)>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT w.id, w.document_id, w.kind, w.status, w.priority, w.retry_count, \
                 w.max_retries, w.processor, w.started_at, w.completed_at, w.error_message, \
                 w.next_retry_at, w.created_at, d.status \
                 FROM work_items w JOIN documents d ON d.id = w.document_id \
                 WHERE w.status IN ('pending', 'in_progress', 'retrying') \
                   AND d.status IN ('processed', 'failed')",
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map([], |row| {
                let item = WorkItem::from_row(row)?;
                let doc_status: String = row.get(13)?;
                Ok((item, DocumentStatus::from_str(&doc_status)))
            })
            .map_err(DatabaseError::Query)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(items)
    }
}
