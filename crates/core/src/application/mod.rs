// Application Layer - Task supervision and supporting loops

pub mod constants;
pub mod registry;
pub mod sampler;
pub mod shutdown;
pub mod supervisor;

// Re-exports
pub use registry::{Notification, NotificationState, TaskRecord, TaskRegistry};
pub use sampler::CapabilitySampler;
pub use shutdown::{shutdown_channel, ShutdownReason, ShutdownSender, ShutdownToken};
pub use supervisor::Supervisor;
