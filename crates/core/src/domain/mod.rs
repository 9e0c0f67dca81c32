// Domain Layer - Task lifecycle, identity and wire-facing messages

pub mod capability;
pub mod error;
pub mod event;
pub mod identity;
pub mod task;
pub mod update;

// Re-exports
pub use capability::{CpuReading, WorkerStats, CPU_UNMEASURED};
pub use error::DomainError;
pub use event::{
    worker_event_channel, InboundMessage, ProcessEvent, ProcessSignal, WorkerEvent,
    WorkerEventReceiver, WorkerEventSender,
};
pub use identity::WorkerIdentity;
pub use task::{KillRequest, RunId, TaskId, TaskPayload, TaskRequest, TaskState};
pub use update::{TaskStatus, TaskUpdate};
