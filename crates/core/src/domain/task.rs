// Task Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{DomainError, Result};

/// Task ID (assigned by the orchestrator)
pub type TaskId = String;

/// Identifies one launch of a task.
///
/// A task id can be re-dispatched after a kill; the run id tells the
/// supervisor which launch a process event belongs to.
pub type RunId = u64;

/// worker.task.request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_id: TaskId,
    #[serde(default)]
    pub payload: TaskPayload,
}

/// Transcoder invocation supplied by the orchestrator
///
/// Passed to the process verbatim (trust boundary). `env: None` inherits the
/// worker environment, `Some` replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

/// worker.task.kill payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillRequest {
    pub task_id: TaskId,
}

impl TaskRequest {
    pub fn new(task_id: impl Into<TaskId>, payload: TaskPayload) -> Self {
        Self {
            task_id: task_id.into(),
            payload,
        }
    }

    /// Reject requests the worker cannot address updates to
    pub fn validate(&self) -> Result<()> {
        if self.task_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "taskId cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Task lifecycle state
///
/// `Received -> InProgress -> Done | Killed`. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Received,
    InProgress,
    Done { success: bool },
    Killed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done { .. } | TaskState::Killed)
    }

    /// Received -> InProgress
    pub fn start(self) -> Result<Self> {
        match self {
            TaskState::Received => Ok(TaskState::InProgress),
            other => Err(other.invalid("INPROGRESS")),
        }
    }

    /// InProgress -> Done
    pub fn finish(self, success: bool) -> Result<Self> {
        match self {
            TaskState::InProgress => Ok(TaskState::Done { success }),
            other => Err(other.invalid("DONE")),
        }
    }

    /// InProgress -> Killed
    pub fn kill(self) -> Result<Self> {
        match self {
            TaskState::InProgress => Ok(TaskState::Killed),
            other => Err(other.invalid("KILLED")),
        }
    }

    fn invalid(self, to: &str) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.to_string(),
            to: to.to_string(),
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Received => write!(f, "RECEIVED"),
            TaskState::InProgress => write!(f, "INPROGRESS"),
            TaskState::Done { success: true } => write!(f, "DONE(success)"),
            TaskState::Done { success: false } => write!(f, "DONE(failure)"),
            TaskState::Killed => write!(f, "KILLED"),
        }
    }
}
