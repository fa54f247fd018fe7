//! Broker seam: the external system that actually runs tasks.
//!
//! The manager and worker only ever talk to [`Broker`]; deployments
//! plug in their queueing system behind it. The in-memory
//! implementation used by tests runs submitted jobs on tokio tasks.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TaskId;

/// Job lifecycle state as the broker reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Aborted,
}

impl JobState {
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failure | JobState::Aborted
        )
    }
}

/// Terminal payload a finished job leaves with the broker.
///
/// A `Failure` value carries the encoded transferable-error carrier
/// produced on the worker side.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(serde_json::Value),
    Failure(serde_json::Value),
    Aborted,
}

/// Broker collaborator failures.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("job not found: {uuid}")]
    JobNotFound { uuid: Uuid },

    #[error("job has no result yet: {uuid}")]
    ResultNotReady { uuid: Uuid },

    #[error("broker backend failure: {message}")]
    Backend { message: String },
}

impl BrokerError {
    pub fn backend(message: impl ToString) -> Self {
        BrokerError::Backend {
            message: message.to_string(),
        }
    }
}

/// Interface to the external task-execution system.
///
/// Jobs are keyed by the uuid half of the composite id; the full id is
/// threaded to workers through the submission parameters.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a named task on a queue.
    async fn submit(
        &self,
        name: &str,
        queue: &str,
        task_id: &TaskId,
        params: serde_json::Value,
    ) -> Result<(), BrokerError>;

    /// Current lifecycle state of a job.
    async fn job_state(&self, uuid: Uuid) -> Result<JobState, BrokerError>;

    /// Terminal payload of a finished job.
    async fn job_result(&self, uuid: Uuid) -> Result<JobOutcome, BrokerError>;

    /// Drop the broker's copy of a job's result.
    async fn forget_job(&self, uuid: Uuid) -> Result<(), BrokerError>;

    /// Ask a running job to stop. Cooperative; takes effect when the
    /// worker next polls [`Broker::abort_requested`].
    async fn request_abort(&self, uuid: Uuid) -> Result<(), BrokerError>;

    /// Whether an abort has been requested for a job.
    async fn abort_requested(&self, uuid: Uuid) -> Result<bool, BrokerError>;
}

#[cfg(test)]
pub(crate) use in_memory::InMemoryBroker;

#[cfg(test)]
mod in_memory {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use futures::future::BoxFuture;

    use super::*;

    type JobHandler =
        Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, JobOutcome> + Send + Sync>;

    struct JobEntry {
        state: JobState,
        outcome: Option<JobOutcome>,
        abort_requested: bool,
    }

    /// Broker double that runs registered handlers on tokio tasks.
    #[derive(Default)]
    pub(crate) struct InMemoryBroker {
        handlers: Mutex<HashMap<String, JobHandler>>,
        jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>>,
    }

    impl InMemoryBroker {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Register the handler dispatched for a task name.
        pub(crate) fn register<F>(&self, name: &str, handler: F)
        where
            F: Fn(serde_json::Value) -> BoxFuture<'static, JobOutcome> + Send + Sync + 'static,
        {
            self.handlers
                .lock()
                .unwrap()
                .insert(name.to_string(), Arc::new(handler));
        }

        /// Seed a job entry without running anything, for worker tests.
        pub(crate) fn seed_job(&self, uuid: Uuid) {
            self.jobs.lock().unwrap().insert(
                uuid,
                JobEntry {
                    state: JobState::Started,
                    outcome: None,
                    abort_requested: false,
                },
            );
        }

        pub(crate) fn has_job(&self, uuid: Uuid) -> bool {
            self.jobs.lock().unwrap().contains_key(&uuid)
        }
    }

    #[async_trait]
    impl Broker for InMemoryBroker {
        async fn submit(
            &self,
            name: &str,
            _queue: &str,
            task_id: &TaskId,
            params: serde_json::Value,
        ) -> Result<(), BrokerError> {
            let handler: JobHandler = self
                .handlers
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| BrokerError::backend(format!("no handler for {name:?}")))?;

            let uuid: Uuid = task_id.uuid();
            self.jobs.lock().unwrap().insert(
                uuid,
                JobEntry {
                    state: JobState::Pending,
                    outcome: None,
                    abort_requested: false,
                },
            );

            let jobs = Arc::clone(&self.jobs);
            tokio::spawn(async move {
                if let Some(entry) = jobs.lock().unwrap().get_mut(&uuid) {
                    entry.state = JobState::Started;
                }
                let outcome: JobOutcome = handler(params).await;
                if let Some(entry) = jobs.lock().unwrap().get_mut(&uuid) {
                    entry.state = match outcome {
                        JobOutcome::Success(_) => JobState::Success,
                        JobOutcome::Failure(_) => JobState::Failure,
                        JobOutcome::Aborted => JobState::Aborted,
                    };
                    entry.outcome = Some(outcome);
                }
            });
            Ok(())
        }

        async fn job_state(&self, uuid: Uuid) -> Result<JobState, BrokerError> {
            self.jobs
                .lock()
                .unwrap()
                .get(&uuid)
                .map(|entry| entry.state)
                .ok_or(BrokerError::JobNotFound { uuid })
        }

        async fn job_result(&self, uuid: Uuid) -> Result<JobOutcome, BrokerError> {
            let jobs = self.jobs.lock().unwrap();
            let entry = jobs.get(&uuid).ok_or(BrokerError::JobNotFound { uuid })?;
            entry
                .outcome
                .clone()
                .ok_or(BrokerError::ResultNotReady { uuid })
        }

        async fn forget_job(&self, uuid: Uuid) -> Result<(), BrokerError> {
            self.jobs.lock().unwrap().remove(&uuid);
            Ok(())
        }

        async fn request_abort(&self, uuid: Uuid) -> Result<(), BrokerError> {
            let mut jobs = self.jobs.lock().unwrap();
            let entry = jobs
                .get_mut(&uuid)
                .ok_or(BrokerError::JobNotFound { uuid })?;
            entry.abort_requested = true;
            Ok(())
        }

        async fn abort_requested(&self, uuid: Uuid) -> Result<bool, BrokerError> {
            self.jobs
                .lock()
                .unwrap()
                .get(&uuid)
                .map(|entry| entry.abort_requested)
                .ok_or(BrokerError::JobNotFound { uuid })
        }
    }
}
