// Worker constants (ADR: No magic values)

/// CPU sampling interval, also the sampling window (10s)
pub const DEFAULT_STAT_CPU_INTERVAL_MS: u64 = 10_000;

/// Orchestrator endpoint
pub const DEFAULT_ORCHESTRATOR_URL: &str = "http://localhost:3500";

/// Transcoder install directory (Plex Media Server on Linux)
pub const DEFAULT_TRANSCODER_PATH: &str = "/usr/lib/plexmediaserver/";

/// Transcoder executable name
pub const DEFAULT_TRANSCODER_NAME: &str = "Plex Transcoder";

/// Host label when neither configuration nor the OS provides one
pub const UNKNOWN_HOST: &str = "unknown";

/// Task updates held while disconnected (0 disables buffering)
pub const DEFAULT_UPDATE_BUFFER: usize = 256;

/// First reconnect delay (1s)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Reconnect delay ceiling (5s)
pub const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5_000;

/// Reconnect delay randomization (+/- 50%)
pub const RECONNECT_RANDOMIZATION: f64 = 0.5;
