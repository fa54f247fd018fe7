//! Task identity and lifecycle data model.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stowage_common::ProgressReport;

use crate::error::TaskError;

/// How long bookkeeping for an ephemeral task's result stays readable.
pub const EPHEMERAL_TASK_TTL: Duration = Duration::from_secs(60 * 60);

/// How long bookkeeping for a durable task's result stays readable.
pub const DURABLE_TASK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Separator between the context and uuid halves of a [`TaskId`].
pub const TASK_ID_SEPARATOR: &str = "::";

/// Validated partition key scoping a group of tasks to one owner.
///
/// Restricted to `[A-Za-z0-9._-]` so a context can never contain the
/// id separator and prefix scans over composite ids stay unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskContext(String);

impl TaskContext {
    pub fn new(value: impl Into<String>) -> Result<Self, TaskError> {
        let value: String = value.into();
        if value.is_empty() {
            return Err(TaskError::InvalidContext {
                context: value,
                reason: "must not be empty".into(),
            });
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(TaskError::InvalidContext {
                context: value.clone(),
                reason: format!("character {:?} is not allowed", bad),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaskContext {
    type Error = TaskError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskContext> for String {
    fn from(context: TaskContext) -> Self {
        context.0
    }
}

/// Composite task identifier: `context::uuid`.
///
/// Deterministic given its halves, round-trips through its string form,
/// and shares a common prefix with every id in the same context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    context: TaskContext,
    uuid: Uuid,
}

impl TaskId {
    /// Mint a fresh id within a context.
    pub fn generate(context: TaskContext) -> Self {
        Self {
            context,
            uuid: Uuid::new_v4(),
        }
    }

    pub fn from_parts(context: TaskContext, uuid: Uuid) -> Self {
        Self { context, uuid }
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Scan prefix matching every id in a context and nothing else.
    pub fn prefix_for(context: &TaskContext) -> String {
        format!("{}{}", context, TASK_ID_SEPARATOR)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.context, TASK_ID_SEPARATOR, self.uuid)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (context, uuid) =
            value
                .rsplit_once(TASK_ID_SEPARATOR)
                .ok_or_else(|| TaskError::InvalidTaskId {
                    value: value.to_string(),
                })?;
        let context: TaskContext = TaskContext::new(context)?;
        let uuid: Uuid = Uuid::parse_str(uuid).map_err(|_| TaskError::InvalidTaskId {
            value: value.to_string(),
        })?;
        Ok(Self { context, uuid })
    }
}

/// Caller-supplied description of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Registered task name the worker dispatches on.
    pub name: String,
    /// Ephemeral results are discarded once read.
    pub ephemeral: bool,
    /// Broker queue the task is routed to.
    pub queue: String,
}

/// Lifecycle state of a task, mirrored from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Aborted,
}

impl TaskState {
    /// Terminal states: the task will never run again.
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Aborted
        )
    }
}

/// Point-in-time status view; derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_uuid: Uuid,
    pub state: TaskState,
    pub progress: ProgressReport,
}

/// A task's bookkeeping record as held by the info store.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub metadata: TaskMetadata,
    pub progress: Option<ProgressReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_rejects_separator_characters() {
        assert!(TaskContext::new("jobs:prod").is_err());
        assert!(TaskContext::new("").is_err());
        assert!(TaskContext::new("has space").is_err());
        assert!(TaskContext::new("user-42.prod_a").is_ok());
    }

    #[test]
    fn test_task_id_round_trip() {
        let context: TaskContext = TaskContext::new("user-42").unwrap();
        let id: TaskId = TaskId::generate(context.clone());
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.context(), &context);
    }

    #[test]
    fn test_task_id_rejects_garbage() {
        assert!("no-separator".parse::<TaskId>().is_err());
        assert!("ctx::not-a-uuid".parse::<TaskId>().is_err());
        assert!(format!("bad ctx::{}", Uuid::new_v4())
            .parse::<TaskId>()
            .is_err());
    }

    #[test]
    fn test_prefix_matches_own_ids_only() {
        let a: TaskContext = TaskContext::new("alpha").unwrap();
        let ab: TaskContext = TaskContext::new("alpha-beta").unwrap();
        let id: TaskId = TaskId::generate(ab.clone());
        // "alpha::" must not prefix-match ids from "alpha-beta".
        assert!(!id.to_string().starts_with(&TaskId::prefix_for(&a)));
        assert!(id.to_string().starts_with(&TaskId::prefix_for(&ab)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Pending.is_done());
        assert!(!TaskState::Started.is_done());
        assert!(!TaskState::Retry.is_done());
        assert!(TaskState::Success.is_done());
        assert!(TaskState::Failure.is_done());
        assert!(TaskState::Aborted.is_done());
    }
}
