// Port Layer - Interfaces for external dependencies

pub mod control_channel;
pub mod cpu_probe;
pub mod id_provider; // For deterministic testing
pub mod process_launcher;
pub mod time_provider;

// Re-exports
pub use control_channel::ControlChannel;
pub use cpu_probe::{CpuProbe, ProbeError};
pub use id_provider::IdProvider;
pub use process_launcher::{LaunchError, ProcessEvents, ProcessHandle, ProcessLauncher};
pub use time_provider::TimeProvider;
