//! Distributed task manager.
//!
//! The submitting side hands work to an external broker and keeps its
//! own bookkeeping in a TTL-bound KV store; the worker side wraps task
//! bodies with retry and cooperative cancellation. Errors cross the
//! broker boundary through a JSON carrier that preserves at least the
//! concrete type name and message.

mod broker;
mod codec;
mod error;
mod manager;
mod models;
mod store;
mod worker;

pub use broker::{Broker, BrokerError, JobOutcome, JobState};
pub use codec::{TransferableError, TransferredError};
pub use error::TaskError;
pub use manager::{TaskManager, TASK_ID_PARAM_KEY};
pub use models::{
    TaskContext, TaskId, TaskMetadata, TaskRecord, TaskState, TaskStatus, DURABLE_TASK_TTL,
    EPHEMERAL_TASK_TTL, TASK_ID_SEPARATOR,
};
pub use store::{SqliteTaskStore, StoredTask, TaskInfoStore, TaskStoreBackend, TaskStoreError};
pub use worker::{execute, ExecutionPolicy, TaskOutcome};
