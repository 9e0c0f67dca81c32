// Events serialized onto the supervisor loop

use tokio::sync::{mpsc, oneshot};

use super::capability::WorkerStats;
use super::task::{KillRequest, RunId, TaskId, TaskRequest};

/// Everything the supervisor reacts to, in arrival order
#[derive(Debug)]
pub enum WorkerEvent {
    /// Message from the orchestrator
    Inbound(InboundMessage),
    /// Lifecycle signal from a supervised process
    Process(ProcessSignal),
    /// Fresh CPU utilization sample
    CpuSample(f32),
}

#[derive(Debug)]
pub enum InboundMessage {
    /// worker.stats, answered through the reply channel
    Stats(oneshot::Sender<WorkerStats>),
    TaskRequest(TaskRequest),
    TaskKill(KillRequest),
}

/// Terminal process signals
///
/// `Exit` fires when the process is reaped, `Close` once its stdio streams
/// are drained too. Both may arrive for the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Exit { code: Option<i32> },
    Close { code: Option<i32> },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSignal {
    pub task_id: TaskId,
    pub run_id: RunId,
    pub event: ProcessEvent,
}

pub type WorkerEventSender = mpsc::UnboundedSender<WorkerEvent>;
pub type WorkerEventReceiver = mpsc::UnboundedReceiver<WorkerEvent>;

/// Create the supervisor event queue
pub fn worker_event_channel() -> (WorkerEventSender, WorkerEventReceiver) {
    mpsc::unbounded_channel()
}
