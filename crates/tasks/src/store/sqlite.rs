//! SQLite backend for the task info store.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use super::backend::{StoredTask, TaskStoreBackend, TaskStoreError};

/// SQLite-based task store backend.
///
/// Persists task bookkeeping in a local database. Uses WAL mode for
/// better concurrent read performance.
pub struct SqliteTaskStore {
    /// Database connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
    /// Table name (versioned for schema migrations).
    table_name: String,
}

impl SqliteTaskStore {
    /// Database schema version.
    const STORE_DB_VERSION: u32 = 1;

    /// Create or open a SQLite task store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: &Path) -> Result<Self, TaskStoreError> {
        let conn: Connection = Connection::open(db_path).map_err(TaskStoreError::backend)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(TaskStoreError::backend)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(TaskStoreError::backend)?;

        let table_name: String = format!("task_info_v{}", Self::STORE_DB_VERSION);

        let create_sql: String = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT NOT NULL PRIMARY KEY,
                metadata TEXT NOT NULL,
                progress TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            table_name
        );
        conn.execute(&create_sql, [])
            .map_err(TaskStoreError::backend)?;

        // Index for TTL cleanup.
        let index_sql: String = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_expires_at ON {}(expires_at)",
            table_name, table_name
        );
        conn.execute(&index_sql, [])
            .map_err(TaskStoreError::backend)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name,
        })
    }

    /// Delete expired records.
    ///
    /// # Returns
    /// Number of records deleted.
    pub fn cleanup_expired(&self) -> Result<usize, TaskStoreError> {
        let now: i64 = current_epoch_seconds();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE expires_at <= ?", self.table_name),
            params![now],
        )
        .map_err(TaskStoreError::backend)
    }

    /// Number of records, live and expired.
    pub fn count(&self) -> Result<usize, TaskStoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", self.table_name),
                [],
                |row| row.get(0),
            )
            .map_err(TaskStoreError::backend)?;
        Ok(count as usize)
    }
}

#[async_trait::async_trait]
impl TaskStoreBackend for SqliteTaskStore {
    async fn insert(
        &self,
        key: &str,
        metadata_json: &str,
        ttl_secs: i64,
    ) -> Result<(), TaskStoreError> {
        let now: i64 = current_epoch_seconds();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, metadata, progress, created_at, expires_at)
                 VALUES (?, ?, NULL, ?, ?)",
                self.table_name
            ),
            params![key, metadata_json, now, now + ttl_secs],
        )
        .map_err(TaskStoreError::backend)?;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<StoredTask>, TaskStoreError> {
        let now: i64 = current_epoch_seconds();
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT key, metadata, progress, expires_at FROM {}
                 WHERE key = ? AND expires_at > ?",
                self.table_name
            ),
            params![key, now],
            |row| {
                Ok(StoredTask {
                    key: row.get(0)?,
                    metadata_json: row.get(1)?,
                    progress_json: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(TaskStoreError::backend)
    }

    async fn set_progress(&self, key: &str, progress_json: &str) -> Result<bool, TaskStoreError> {
        let now: i64 = current_epoch_seconds();
        let conn = self.conn.lock().unwrap();
        let updated: usize = conn
            .execute(
                &format!(
                    "UPDATE {} SET progress = ? WHERE key = ? AND expires_at > ?",
                    self.table_name
                ),
                params![progress_json, key, now],
            )
            .map_err(TaskStoreError::backend)?;
        Ok(updated > 0)
    }

    async fn scan_page(
        &self,
        prefix: &str,
        after_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredTask>, TaskStoreError> {
        let now: i64 = current_epoch_seconds();
        let pattern: String = format!("{}%", escape_like(prefix));
        let after: &str = after_key.unwrap_or("");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key, metadata, progress, expires_at FROM {}
                 WHERE key LIKE ? ESCAPE '\\' AND key > ? AND expires_at > ?
                 ORDER BY key LIMIT ?",
                self.table_name
            ))
            .map_err(TaskStoreError::backend)?;

        let rows = stmt
            .query_map(params![pattern, after, now, limit as i64], |row| {
                Ok(StoredTask {
                    key: row.get(0)?,
                    metadata_json: row.get(1)?,
                    progress_json: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            })
            .map_err(TaskStoreError::backend)?;

        rows.collect::<Result<Vec<StoredTask>, _>>()
            .map_err(TaskStoreError::backend)
    }

    async fn remove(&self, key: &str) -> Result<(), TaskStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?", self.table_name),
            params![key],
        )
        .map_err(TaskStoreError::backend)?;
        Ok(())
    }
}

/// Escape LIKE wildcards in a literal prefix. Task contexts allow `_`,
/// which LIKE would otherwise treat as a single-character wildcard.
fn escape_like(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Get current time as epoch seconds.
fn current_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> SqliteTaskStore {
        SqliteTaskStore::open(&dir.path().join("tasks.db")).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        assert!(store.fetch("ctx::1").await.unwrap().is_none());

        store.insert("ctx::1", "{\"name\":\"t\"}", 3600).await.unwrap();
        let stored: StoredTask = store.fetch("ctx::1").await.unwrap().unwrap();
        assert_eq!(stored.metadata_json, "{\"name\":\"t\"}");
        assert!(stored.progress_json.is_none());
    }

    #[tokio::test]
    async fn test_expired_record_is_absent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.insert("ctx::1", "{}", -10).await.unwrap();
        assert!(store.fetch("ctx::1").await.unwrap().is_none());
        assert!(!store.set_progress("ctx::1", "{}").await.unwrap());

        // Still physically present until cleanup runs.
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.cleanup_expired().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_progress_keeps_ttl() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.insert("ctx::1", "{}", 3600).await.unwrap();
        let before: i64 = store.fetch("ctx::1").await.unwrap().unwrap().expires_at;

        assert!(store.set_progress("ctx::1", "{\"actual\":1.0}").await.unwrap());
        let stored: StoredTask = store.fetch("ctx::1").await.unwrap().unwrap();
        assert_eq!(stored.progress_json.as_deref(), Some("{\"actual\":1.0}"));
        assert_eq!(stored.expires_at, before);
    }

    #[tokio::test]
    async fn test_scan_page_prefix_isolation_and_ordering() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        for key in ["a::1", "a::2", "a::3", "ab::1", "b::1"] {
            store.insert(key, "{}", 3600).await.unwrap();
        }

        let first = store.scan_page("a::", None, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            vec!["a::1", "a::2"]
        );

        let rest = store.scan_page("a::", Some("a::2"), 10).await.unwrap();
        assert_eq!(
            rest.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            vec!["a::3"]
        );
    }

    #[tokio::test]
    async fn test_scan_underscore_prefix_is_literal() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        // "ctx_a" must not match "ctxXa" through the LIKE wildcard.
        store.insert("ctx_a::1", "{}", 3600).await.unwrap();
        store.insert("ctxXa::1", "{}", 3600).await.unwrap();

        let page = store.scan_page("ctx_a::", None, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].key, "ctx_a::1");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.insert("ctx::1", "{}", 3600).await.unwrap();
        store.remove("ctx::1").await.unwrap();
        assert!(store.fetch("ctx::1").await.unwrap().is_none());
        store.remove("ctx::1").await.unwrap();
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tasks.db");

        {
            let store = SqliteTaskStore::open(&db_path).unwrap();
            store.insert("ctx::1", "{}", 3600).await.unwrap();
        }
        {
            let store = SqliteTaskStore::open(&db_path).unwrap();
            assert!(store.fetch("ctx::1").await.unwrap().is_some());
        }
    }
}
