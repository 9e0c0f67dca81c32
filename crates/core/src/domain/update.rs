// worker.task.update message

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Lifecycle status reported to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Received,
    InProgress,
    Done,
}

/// Outbound task update
///
/// `result`, `exit_code` and `error` only appear on `done` updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskUpdate {
    fn status_only(task_id: &str, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            result: None,
            exit_code: None,
            error: None,
        }
    }

    pub fn received(task_id: &str) -> Self {
        Self::status_only(task_id, TaskStatus::Received)
    }

    pub fn in_progress(task_id: &str) -> Self {
        Self::status_only(task_id, TaskStatus::InProgress)
    }

    /// Process terminated. A signal death has no exit code and counts as failure.
    pub fn completed(task_id: &str, exit_code: Option<i32>) -> Self {
        Self {
            result: Some(exit_code == Some(0)),
            exit_code,
            ..Self::status_only(task_id, TaskStatus::Done)
        }
    }

    /// Process could not be started or supervised
    pub fn failed(task_id: &str, error: impl Into<String>) -> Self {
        Self {
            result: Some(false),
            error: Some(error.into()),
            ..Self::status_only(task_id, TaskStatus::Done)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status == TaskStatus::Done
    }
}
