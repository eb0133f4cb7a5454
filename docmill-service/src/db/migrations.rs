//! Database schema migrations.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Run all database migrations.
///
/// Called during database initialization to ensure the schema is up to date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    conn.execute_batch(
        r#"
        -- Documents table
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            storage_locator TEXT,
            file_type TEXT NOT NULL DEFAULT 'other',
            size_bytes INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT,
            extracted_text TEXT,
            summary TEXT,
            category TEXT,
            status TEXT NOT NULL DEFAULT 'uploaded',
            status_label TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            analysis TEXT,
            started_at TEXT,
            completed_at TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
        CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(content_hash);

        -- Work items table
        CREATE TABLE IF NOT EXISTS work_items (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'full_pipeline',
            status TEXT NOT NULL DEFAULT 'pending',
            priority INTEGER NOT NULL DEFAULT 1,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            processor TEXT,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT,
            next_retry_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_work_items_document ON work_items(document_id);
        CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status);
    "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    Ok(())
}
