// Process Launcher Port
// Abstraction over spawning the transcoder and wiring its lifecycle events

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{
    ProcessEvent, ProcessSignal, RunId, TaskId, TaskPayload, WorkerEvent, WorkerEventSender,
};

/// Launch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
}

/// Sink for one run's lifecycle events
///
/// Events are queued onto the supervisor loop; once the loop is gone they are
/// silently discarded.
#[derive(Debug, Clone)]
pub struct ProcessEvents {
    task_id: TaskId,
    run_id: RunId,
    tx: WorkerEventSender,
}

impl ProcessEvents {
    pub fn new(task_id: impl Into<TaskId>, run_id: RunId, tx: WorkerEventSender) -> Self {
        Self {
            task_id: task_id.into(),
            run_id,
            tx,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn exit(&self, code: Option<i32>) {
        self.send(ProcessEvent::Exit { code });
    }

    pub fn close(&self, code: Option<i32>) {
        self.send(ProcessEvent::Close { code });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(ProcessEvent::Error {
            message: message.into(),
        });
    }

    fn send(&self, event: ProcessEvent) {
        let _ = self.tx.send(WorkerEvent::Process(ProcessSignal {
            task_id: self.task_id.clone(),
            run_id: self.run_id,
            event,
        }));
    }
}

/// Exclusive handle on a launched process
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, kill_tx: oneshot::Sender<()>) -> Self {
        Self {
            pid,
            kill_tx: Some(kill_tx),
        }
    }

    /// Handle for a run whose process never started
    pub fn detached() -> Self {
        Self {
            pid: None,
            kill_tx: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the supervising task to terminate the process.
    ///
    /// Returns false if there is nothing left to signal.
    pub fn kill(&mut self) -> bool {
        match self.kill_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Process Launcher trait
///
/// Implementations:
/// - TranscoderLauncher: spawns the configured transcoder binary
/// - ScriptedLauncher: test double driven by hand
pub trait ProcessLauncher: Send + Sync {
    /// Start the process for one task run.
    ///
    /// Must not block: the process is supervised elsewhere and reports
    /// through `events`.
    ///
    /// # Errors
    /// - LaunchError::SpawnFailed if the process cannot be started
    fn launch(
        &self,
        payload: &TaskPayload,
        events: ProcessEvents,
    ) -> Result<ProcessHandle, LaunchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockRun {
        payload: TaskPayload,
        events: ProcessEvents,
        kill_rx: oneshot::Receiver<()>,
        killed: bool,
    }

    #[derive(Default)]
    struct ScriptState {
        runs: Vec<MockRun>,
        failures: HashMap<TaskId, String>,
    }

    /// Launcher that never starts anything.
    ///
    /// Tests fire lifecycle events by hand through `events_for`.
    #[derive(Default)]
    pub struct ScriptedLauncher {
        state: Mutex<ScriptState>,
    }

    impl ScriptedLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every launch of `task_id` fail with `message`
        pub fn fail_task(&self, task_id: impl Into<TaskId>, message: impl Into<String>) {
            self.state
                .lock()
                .unwrap()
                .failures
                .insert(task_id.into(), message.into());
        }

        pub fn launch_count(&self) -> usize {
            self.state.lock().unwrap().runs.len()
        }

        /// Payload of the most recent run of `task_id`
        pub fn payload_for(&self, task_id: &str) -> Option<TaskPayload> {
            let state = self.state.lock().unwrap();
            state
                .runs
                .iter()
                .rev()
                .find(|r| r.events.task_id() == task_id)
                .map(|r| r.payload.clone())
        }

        /// Event sink of the most recent run of `task_id`
        pub fn events_for(&self, task_id: &str) -> Option<ProcessEvents> {
            let state = self.state.lock().unwrap();
            state
                .runs
                .iter()
                .rev()
                .find(|r| r.events.task_id() == task_id)
                .map(|r| r.events.clone())
        }

        /// Whether the most recent run of `task_id` was asked to terminate
        pub fn was_killed(&self, task_id: &str) -> bool {
            let mut state = self.state.lock().unwrap();
            match state
                .runs
                .iter_mut()
                .rev()
                .find(|r| r.events.task_id() == task_id)
            {
                Some(run) => {
                    if !run.killed && run.kill_rx.try_recv().is_ok() {
                        run.killed = true;
                    }
                    run.killed
                }
                None => false,
            }
        }
    }

    impl ProcessLauncher for ScriptedLauncher {
        fn launch(
            &self,
            payload: &TaskPayload,
            events: ProcessEvents,
        ) -> Result<ProcessHandle, LaunchError> {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = state.failures.get(events.task_id()) {
                return Err(LaunchError::SpawnFailed(message.clone()));
            }

            let (kill_tx, kill_rx) = oneshot::channel();
            state.runs.push(MockRun {
                payload: payload.clone(),
                events,
                kill_rx,
                killed: false,
            });
            Ok(ProcessHandle::new(Some(4242), kill_tx))
        }
    }
}
