// Task Registry - in-flight tasks keyed by task id
//
// Owned by the supervisor loop; membership means "in progress".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::error::{DomainError, Result};
use crate::domain::{RunId, TaskId, TaskState};
use crate::port::ProcessHandle;

/// Whether the terminal update for a run went out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    NotNotified,
    Notified,
}

/// Exactly-once completion guard
///
/// `close`, `exit` and `error` may all fire for one run. Only the handler that
/// wins `try_claim` may emit the `done` update.
#[derive(Debug, Default)]
pub struct Notification {
    notified: AtomicBool,
}

impl Notification {
    pub fn new() -> Self {
        Self::default()
    }

    /// NotNotified -> Notified. Returns true for exactly one caller.
    pub fn try_claim(&self) -> bool {
        self.notified
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn state(&self) -> NotificationState {
        if self.notified.load(Ordering::Acquire) {
            NotificationState::Notified
        } else {
            NotificationState::NotNotified
        }
    }
}

/// One dispatched job
#[derive(Debug)]
pub struct TaskRecord {
    task_id: TaskId,
    run_id: RunId,
    state: TaskState,
    process: ProcessHandle,
    notification: Notification,
    started_at: i64,
}

impl TaskRecord {
    pub fn new(
        task_id: impl Into<TaskId>,
        run_id: RunId,
        process: ProcessHandle,
        now_millis: i64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            run_id,
            state: TaskState::Received,
            process,
            notification: Notification::new(),
            started_at: now_millis,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn elapsed_ms(&self, now_millis: i64) -> i64 {
        now_millis - self.started_at
    }

    pub fn start(&mut self) -> Result<()> {
        self.state = self.state.start()?;
        Ok(())
    }

    pub fn finish(&mut self, success: bool) -> Result<()> {
        self.state = self.state.finish(success)?;
        Ok(())
    }

    /// Signal the process and retire the record as Killed.
    ///
    /// Returns whether a live process was signalled.
    pub fn kill(&mut self) -> Result<bool> {
        self.state = self.state.kill()?;
        Ok(self.process.kill())
    }
}

/// Authoritative map of in-flight tasks
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, TaskRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record. An id that is already live is rejected, never overwritten.
    pub fn insert(&mut self, record: TaskRecord) -> Result<()> {
        if self.tasks.contains_key(record.task_id()) {
            return Err(DomainError::DuplicateTask(record.task_id.clone()));
        }
        self.tasks.insert(record.task_id.clone(), record);
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.get(task_id)
    }

    pub fn remove(&mut self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.remove(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
