//! Error taxonomy for the task manager.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::store::TaskStoreError;

/// Errors surfaced to task-manager callers.
///
/// Broker- and store-level failures are wrapped here; callers never see
/// the collaborator error types directly off a manager method.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The broker has no job under this id.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// A result was requested before the task reached a terminal state.
    #[error("task has not completed: {task_id}")]
    TaskNotDone { task_id: String },

    /// The task was aborted before producing a result.
    #[error("task was aborted: {task_id}")]
    TaskAborted { task_id: String },

    /// The task body raised; reconstructed from the transferred carrier.
    #[error("task raised {type_name}: {message}")]
    TaskRaised { type_name: String, message: String },

    /// Partition key failed validation.
    #[error("invalid task context {context:?}: {reason}")]
    InvalidContext { context: String, reason: String },

    /// Composite id string did not parse.
    #[error("malformed task id: {value:?}")]
    InvalidTaskId { value: String },

    /// Broker collaborator failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Task info store failure.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}
