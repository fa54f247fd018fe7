//! Task info store: bookkeeping records for submitted tasks.
//!
//! A thin facade over a pluggable KV backend. Records are keyed by the
//! composite task id, carry metadata and progress as two slots of one
//! record, and expire on a TTL fixed at creation. Reads are tolerant:
//! a record that no longer decodes is treated as absent with a logged
//! warning, never an error.

mod backend;
mod sqlite;

pub use backend::{StoredTask, TaskStoreBackend, TaskStoreError};
pub use sqlite::SqliteTaskStore;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use stowage_common::ProgressReport;

use crate::models::{TaskContext, TaskId, TaskMetadata, TaskRecord, DURABLE_TASK_TTL, EPHEMERAL_TASK_TTL};

/// Records fetched per backend round-trip during a context scan.
const SCAN_BATCH_SIZE: usize = 100;

/// Facade over a task store backend.
#[derive(Clone)]
pub struct TaskInfoStore {
    backend: Arc<dyn TaskStoreBackend>,
}

impl TaskInfoStore {
    pub fn new(backend: Arc<dyn TaskStoreBackend>) -> Self {
        Self { backend }
    }

    /// Register a task's bookkeeping record.
    ///
    /// The TTL is chosen from the metadata's ephemeral flag and covers
    /// the whole record; later progress writes never extend it.
    pub async fn create_task(
        &self,
        task_id: &TaskId,
        metadata: &TaskMetadata,
    ) -> Result<(), TaskStoreError> {
        let ttl: Duration = if metadata.ephemeral {
            EPHEMERAL_TASK_TTL
        } else {
            DURABLE_TASK_TTL
        };
        let metadata_json: String =
            serde_json::to_string(metadata).map_err(|err| TaskStoreError::Serialization {
                message: err.to_string(),
            })?;
        self.backend
            .insert(&task_id.to_string(), &metadata_json, ttl.as_secs() as i64)
            .await
    }

    /// Metadata of a live task, or `None` when missing, expired, or
    /// undecodable.
    pub async fn get_task_metadata(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<TaskMetadata>, TaskStoreError> {
        let stored = match self.backend.fetch(&task_id.to_string()).await? {
            Some(stored) => stored,
            None => return Ok(None),
        };
        match serde_json::from_str(&stored.metadata_json) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "undecodable task metadata");
                Ok(None)
            }
        }
    }

    /// Last reported progress of a live task, if any.
    pub async fn get_task_progress(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<ProgressReport>, TaskStoreError> {
        let stored = match self.backend.fetch(&task_id.to_string()).await? {
            Some(stored) => stored,
            None => return Ok(None),
        };
        let progress_json: String = match stored.progress_json {
            Some(json) => json,
            None => return Ok(None),
        };
        match serde_json::from_str(&progress_json) {
            Ok(progress) => Ok(Some(progress)),
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "undecodable task progress");
                Ok(None)
            }
        }
    }

    /// Overwrite a task's progress slot.
    ///
    /// A write against a missing or expired record is dropped silently;
    /// workers may outlive the bookkeeping they report to.
    pub async fn set_task_progress(
        &self,
        task_id: &TaskId,
        progress: &ProgressReport,
    ) -> Result<(), TaskStoreError> {
        let progress_json: String =
            serde_json::to_string(progress).map_err(|err| TaskStoreError::Serialization {
                message: err.to_string(),
            })?;
        let updated: bool = self
            .backend
            .set_progress(&task_id.to_string(), &progress_json)
            .await?;
        if !updated {
            tracing::debug!(task_id = %task_id, "progress for unknown task dropped");
        }
        Ok(())
    }

    /// All live records in a context, scanning the backend in batches.
    ///
    /// Records that fail to decode are skipped with a warning.
    pub async fn list_tasks(
        &self,
        context: &TaskContext,
    ) -> Result<Vec<TaskRecord>, TaskStoreError> {
        let prefix: String = TaskId::prefix_for(context);
        let mut records: Vec<TaskRecord> = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page: Vec<StoredTask> = self
                .backend
                .scan_page(&prefix, after.as_deref(), SCAN_BATCH_SIZE)
                .await?;
            let page_len: usize = page.len();

            for stored in page {
                after = Some(stored.key.clone());
                match decode_record(&stored) {
                    Some(record) => records.push(record),
                    None => {
                        tracing::warn!(key = %stored.key, "skipping undecodable task record");
                    }
                }
            }

            if page_len < SCAN_BATCH_SIZE {
                return Ok(records);
            }
        }
    }

    /// Remove a task's record. Idempotent.
    pub async fn remove_task(&self, task_id: &TaskId) -> Result<(), TaskStoreError> {
        self.backend.remove(&task_id.to_string()).await
    }
}

fn decode_record(stored: &StoredTask) -> Option<TaskRecord> {
    let task_id: TaskId = TaskId::from_str(&stored.key).ok()?;
    let metadata: TaskMetadata = serde_json::from_str(&stored.metadata_json).ok()?;
    let progress: Option<ProgressReport> = stored
        .progress_json
        .as_deref()
        .and_then(|json| serde_json::from_str(json).ok());
    Some(TaskRecord {
        task_id,
        metadata,
        progress,
    })
}

#[cfg(test)]
pub(crate) use in_memory::InMemoryTaskStore;
