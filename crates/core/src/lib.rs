// Plexfarm Core - Task lifecycle, registry and ports
// NO infrastructure dependencies: processes, sampling and transport live behind ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
