//! Task store backend trait.

use async_trait::async_trait;
use thiserror::Error;

/// Task store backend failures.
#[derive(Error, Debug)]
pub enum TaskStoreError {
    #[error("task store backend failure: {message}")]
    Backend { message: String },

    #[error("task record failed to serialize: {message}")]
    Serialization { message: String },
}

impl TaskStoreError {
    pub fn backend(message: impl ToString) -> Self {
        TaskStoreError::Backend {
            message: message.to_string(),
        }
    }
}

/// A stored task record: two payload slots under one key and one TTL.
///
/// The TTL is fixed when the record is created and covers both slots;
/// progress overwrites never extend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTask {
    /// Composite task id in string form.
    pub key: String,
    /// Serialized metadata, written once at creation.
    pub metadata_json: String,
    /// Serialized progress, overwritten as the task advances.
    pub progress_json: Option<String>,
    /// Expiry as epoch seconds.
    pub expires_at: i64,
}

/// Pluggable persistence for task bookkeeping records.
///
/// Implementations must treat expired records as absent on every read
/// path, including scans.
#[async_trait]
pub trait TaskStoreBackend: Send + Sync {
    /// Create a record with its metadata slot and TTL.
    async fn insert(
        &self,
        key: &str,
        metadata_json: &str,
        ttl_secs: i64,
    ) -> Result<(), TaskStoreError>;

    /// Fetch a live record.
    async fn fetch(&self, key: &str) -> Result<Option<StoredTask>, TaskStoreError>;

    /// Overwrite the progress slot, leaving the TTL untouched.
    ///
    /// # Returns
    /// `false` when no live record exists under the key.
    async fn set_progress(&self, key: &str, progress_json: &str) -> Result<bool, TaskStoreError>;

    /// One page of live records whose key starts with `prefix`, in key
    /// order, strictly after `after_key`.
    async fn scan_page(
        &self,
        prefix: &str,
        after_key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredTask>, TaskStoreError>;

    /// Remove a record. Idempotent; removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), TaskStoreError>;
}
