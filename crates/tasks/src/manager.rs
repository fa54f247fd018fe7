//! Submitting-side task manager.
//!
//! Orchestrates the broker (execution) and the task info store
//! (bookkeeping). Lifecycle state always comes from the broker; the
//! store only ever contributes metadata and progress.

use std::sync::Arc;

use serde_json::{Map, Value};

use stowage_common::ProgressReport;

use crate::broker::{Broker, BrokerError, JobOutcome, JobState};
use crate::codec::TransferableError;
use crate::error::TaskError;
use crate::models::{TaskContext, TaskId, TaskMetadata, TaskRecord, TaskState, TaskStatus};
use crate::store::TaskInfoStore;

/// Submission parameter under which the composite id reaches workers.
pub const TASK_ID_PARAM_KEY: &str = "task_id";

/// Submitting-side coordinator for distributed tasks.
pub struct TaskManager {
    broker: Arc<dyn Broker>,
    store: TaskInfoStore,
}

impl TaskManager {
    pub fn new(broker: Arc<dyn Broker>, store: TaskInfoStore) -> Self {
        Self { broker, store }
    }

    /// Submit a task and register its bookkeeping record.
    ///
    /// Submission happens before registration, so a registration
    /// failure leaves the job running without bookkeeping. That gap is
    /// accepted: the error is surfaced and the orphan is bounded by the
    /// broker's own result retention.
    pub async fn send_task(
        &self,
        context: &TaskContext,
        name: &str,
        queue: &str,
        ephemeral: bool,
        mut params: Map<String, Value>,
    ) -> Result<TaskId, TaskError> {
        let task_id: TaskId = TaskId::generate(context.clone());
        params.insert(
            TASK_ID_PARAM_KEY.to_string(),
            Value::String(task_id.to_string()),
        );

        self.broker
            .submit(name, queue, &task_id, Value::Object(params))
            .await?;

        let metadata = TaskMetadata {
            name: name.to_string(),
            ephemeral,
            queue: queue.to_string(),
        };
        if let Err(err) = self.store.create_task(&task_id, &metadata).await {
            tracing::error!(
                task_id = %task_id,
                error = %err,
                "task submitted but bookkeeping registration failed; job runs unrecorded"
            );
            return Err(err.into());
        }

        Ok(task_id)
    }

    /// Current state and progress of a task.
    ///
    /// Progress is an overlay: terminal success/failure always reads as
    /// complete and a pending task as zero, regardless of what the
    /// worker last reported; only running states consult the store.
    pub async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus, TaskError> {
        let state: TaskState = self.job_state(task_id).await?;

        let progress: ProgressReport = match state {
            TaskState::Success | TaskState::Failure => ProgressReport::DONE,
            TaskState::Pending => ProgressReport::ZERO,
            TaskState::Started | TaskState::Retry | TaskState::Aborted => self
                .store
                .get_task_progress(task_id)
                .await?
                .unwrap_or(ProgressReport::ZERO),
        };

        Ok(TaskStatus {
            task_uuid: task_id.uuid(),
            state,
            progress,
        })
    }

    /// Result of a finished task.
    ///
    /// A failure outcome is decoded through the transferable-error
    /// codec into [`TaskError::TaskRaised`]. Reading an ephemeral
    /// task's result consumes it: the broker result and the record are
    /// dropped as a side effect, with cleanup failures logged rather
    /// than raised.
    pub async fn get_task_result(&self, task_id: &TaskId) -> Result<Value, TaskError> {
        let state: TaskState = self.job_state(task_id).await?;
        if !state.is_done() {
            return Err(TaskError::TaskNotDone {
                task_id: task_id.to_string(),
            });
        }

        let outcome: JobOutcome = self
            .broker
            .job_result(task_id.uuid())
            .await
            .map_err(|err| wrap_broker_error(err, task_id))?;

        let result: Result<Value, TaskError> = match outcome {
            JobOutcome::Success(value) => Ok(value),
            JobOutcome::Failure(payload) => Err(failure_to_error(&payload)),
            JobOutcome::Aborted => Err(TaskError::TaskAborted {
                task_id: task_id.to_string(),
            }),
        };

        self.cleanup_if_ephemeral(task_id).await;
        result
    }

    /// Cancel a task.
    ///
    /// Requests an abort only when the task is still running; the
    /// bookkeeping record is removed unconditionally, even for tasks
    /// the broker no longer knows.
    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<(), TaskError> {
        match self.broker.job_state(task_id.uuid()).await {
            Ok(state) if !state.is_done() => {
                self.broker
                    .request_abort(task_id.uuid())
                    .await
                    .map_err(|err| wrap_broker_error(err, task_id))?;
            }
            Ok(_) => {}
            Err(BrokerError::JobNotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        self.store.remove_task(task_id).await?;
        Ok(())
    }

    /// All registered tasks in a context.
    pub async fn list_tasks(&self, context: &TaskContext) -> Result<Vec<TaskRecord>, TaskError> {
        Ok(self.store.list_tasks(context).await?)
    }

    async fn job_state(&self, task_id: &TaskId) -> Result<TaskState, TaskError> {
        let state: JobState = self
            .broker
            .job_state(task_id.uuid())
            .await
            .map_err(|err| wrap_broker_error(err, task_id))?;
        Ok(match state {
            JobState::Pending => TaskState::Pending,
            JobState::Started => TaskState::Started,
            JobState::Retry => TaskState::Retry,
            JobState::Success => TaskState::Success,
            JobState::Failure => TaskState::Failure,
            JobState::Aborted => TaskState::Aborted,
        })
    }

    async fn cleanup_if_ephemeral(&self, task_id: &TaskId) {
        let ephemeral: bool = match self.store.get_task_metadata(task_id).await {
            Ok(Some(metadata)) => metadata.ephemeral,
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "ephemeral cleanup skipped");
                return;
            }
        };
        if !ephemeral {
            return;
        }
        if let Err(err) = self.broker.forget_job(task_id.uuid()).await {
            tracing::warn!(task_id = %task_id, error = %err, "failed to forget broker result");
        }
        if let Err(err) = self.store.remove_task(task_id).await {
            tracing::warn!(task_id = %task_id, error = %err, "failed to remove task record");
        }
    }
}

fn wrap_broker_error(err: BrokerError, task_id: &TaskId) -> TaskError {
    match err {
        BrokerError::JobNotFound { .. } => TaskError::TaskNotFound {
            task_id: task_id.to_string(),
        },
        other => TaskError::Broker(other),
    }
}

/// Decode a failure payload, degrading to the raw payload text when it
/// is not a recognizable carrier.
fn failure_to_error(payload: &Value) -> TaskError {
    match TransferableError::decode(payload) {
        Some(carrier) => TaskError::TaskRaised {
            type_name: carrier.type_name,
            message: carrier.message,
        },
        None => TaskError::TaskRaised {
            type_name: "unknown".to_string(),
            message: payload.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::store::InMemoryTaskStore;

    fn manager_with(broker: Arc<InMemoryBroker>) -> TaskManager {
        let store = TaskInfoStore::new(Arc::new(InMemoryTaskStore::new()));
        TaskManager::new(broker, store)
    }

    fn context() -> TaskContext {
        TaskContext::new("user-7").unwrap()
    }

    async fn wait_until_done(manager: &TaskManager, task_id: &TaskId) -> TaskStatus {
        for _ in 0..200 {
            let status = manager.get_task_status(task_id).await.unwrap();
            if status.state.is_done() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached a terminal state");
    }

    #[tokio::test]
    async fn test_lifecycle_success_end_to_end() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.register("sum", |params| {
            async move {
                // The composite id always rides along in the params.
                assert!(params.get(TASK_ID_PARAM_KEY).is_some());
                JobOutcome::Success(serde_json::json!({"answer": 42}))
            }
            .boxed()
        });
        let manager = manager_with(broker);

        let task_id: TaskId = manager
            .send_task(&context(), "sum", "default", false, Map::new())
            .await
            .unwrap();

        let status: TaskStatus = wait_until_done(&manager, &task_id).await;
        assert_eq!(status.state, TaskState::Success);
        assert_eq!(status.progress, ProgressReport::DONE);

        let result: Value = manager.get_task_result(&task_id).await.unwrap();
        assert_eq!(result, serde_json::json!({"answer": 42}));

        // Durable task: record survives the read.
        let listed = manager.list_tasks(&context()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_result_decodes_carrier() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.register("explode", |_| {
            async {
                let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
                JobOutcome::Failure(TransferableError::from_error(&err).encode())
            }
            .boxed()
        });
        let manager = manager_with(broker);

        let task_id: TaskId = manager
            .send_task(&context(), "explode", "default", false, Map::new())
            .await
            .unwrap();
        wait_until_done(&manager, &task_id).await;

        match manager.get_task_result(&task_id).await {
            Err(TaskError::TaskRaised { type_name, message }) => {
                assert!(type_name.contains("io::Error"));
                assert_eq!(message, "boom");
            }
            other => panic!("expected TaskRaised, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_ephemeral_result_consumed_on_read() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.register("once", |_| {
            async { JobOutcome::Success(Value::Null) }.boxed()
        });
        let manager = manager_with(broker.clone());

        let task_id: TaskId = manager
            .send_task(&context(), "once", "default", true, Map::new())
            .await
            .unwrap();
        wait_until_done(&manager, &task_id).await;

        manager.get_task_result(&task_id).await.unwrap();

        // Broker result and bookkeeping are both gone.
        assert!(!broker.has_job(task_id.uuid()));
        assert!(manager.list_tasks(&context()).await.unwrap().is_empty());
        assert!(matches!(
            manager.get_task_status(&task_id).await,
            Err(TaskError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_result_before_completion_is_refused() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.register("slow", |_| {
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                JobOutcome::Success(Value::Null)
            }
            .boxed()
        });
        let manager = manager_with(broker);

        let task_id: TaskId = manager
            .send_task(&context(), "slow", "default", false, Map::new())
            .await
            .unwrap();

        assert!(matches!(
            manager.get_task_result(&task_id).await,
            Err(TaskError::TaskNotDone { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_overlay_uses_stored_progress_while_running() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.register("slow", |_| {
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                JobOutcome::Success(Value::Null)
            }
            .boxed()
        });
        let store = TaskInfoStore::new(Arc::new(InMemoryTaskStore::new()));
        let manager = TaskManager::new(broker, store.clone());

        let task_id: TaskId = manager
            .send_task(&context(), "slow", "default", false, Map::new())
            .await
            .unwrap();

        // Let the spawned job flip to Started.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = ProgressReport::new(2.0, 8.0);
        store.set_task_progress(&task_id, &report).await.unwrap();

        let status: TaskStatus = manager.get_task_status(&task_id).await.unwrap();
        assert_eq!(status.state, TaskState::Started);
        assert_eq!(status.progress, report);
    }

    #[tokio::test]
    async fn test_cancel_requests_abort_and_clears_record() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.register("slow", |_| {
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                JobOutcome::Success(Value::Null)
            }
            .boxed()
        });
        let manager = manager_with(broker.clone());

        let task_id: TaskId = manager
            .send_task(&context(), "slow", "default", false, Map::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        manager.cancel_task(&task_id).await.unwrap();

        use crate::broker::Broker as _;
        assert!(broker.abort_requested(task_id.uuid()).await.unwrap());
        assert!(manager.list_tasks(&context()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_still_clears_record() {
        let broker = Arc::new(InMemoryBroker::new());
        let manager = manager_with(broker);
        let task_id: TaskId = TaskId::generate(context());

        // No broker job, no record: cancel is a clean no-op.
        manager.cancel_task(&task_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_of_unknown_task() {
        let broker = Arc::new(InMemoryBroker::new());
        let manager = manager_with(broker);
        let task_id: TaskId = TaskId::generate(context());

        assert!(matches!(
            manager.get_task_status(&task_id).await,
            Err(TaskError::TaskNotFound { .. })
        ));
    }
}
