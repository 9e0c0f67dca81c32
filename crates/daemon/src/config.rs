//! Worker configuration (flags and environment)

use clap::Parser;
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use plexfarm_channel::{BackoffConfig, ChannelConfig};
use plexfarm_core::application::constants::{
    DEFAULT_ORCHESTRATOR_URL, DEFAULT_RECONNECT_DELAY_MAX_MS, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_STAT_CPU_INTERVAL_MS, DEFAULT_TRANSCODER_NAME, DEFAULT_TRANSCODER_PATH,
    DEFAULT_UPDATE_BUFFER, RECONNECT_RANDOMIZATION, UNKNOWN_HOST,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// `json` selects JSON output; any other value means pretty
fn parse_log_format(value: &str) -> Result<LogFormat, Infallible> {
    Ok(if value.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    })
}

#[derive(Parser, Debug, Clone)]
#[command(name = "plexfarm-worker")]
#[command(about = "Remote transcode worker for a Plexfarm orchestrator", long_about = None)]
#[command(version)]
pub struct WorkerConfig {
    /// CPU sampling interval and window, in milliseconds
    #[arg(
        long = "stat-cpu-interval",
        env = "STAT_CPU_INTERVAL",
        default_value_t = DEFAULT_STAT_CPU_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub stat_cpu_interval_ms: u64,

    /// Orchestrator base URL
    #[arg(long, env = "ORCHESTRATOR_URL", default_value = DEFAULT_ORCHESTRATOR_URL)]
    pub orchestrator_url: String,

    /// Directory containing the transcoder
    #[arg(long, env = "TRANSCODER_PATH", default_value = DEFAULT_TRANSCODER_PATH)]
    pub transcoder_path: PathBuf,

    /// Transcoder executable name
    #[arg(long, env = "TRANSCODER_NAME", default_value = DEFAULT_TRANSCODER_NAME)]
    pub transcoder_name: String,

    /// Host label announced to the orchestrator (defaults to the OS hostname)
    #[arg(long, env = "HOSTNAME")]
    pub host: Option<String>,

    /// Environment keys passed to the transcoder (comma separated)
    #[arg(long, env = "TRANSCODER_ENV_ALLOWLIST", value_delimiter = ',')]
    pub env_allowlist: Option<Vec<String>>,

    /// Task updates buffered while disconnected (0 drops them)
    #[arg(long, env = "WORKER_UPDATE_BUFFER", default_value_t = DEFAULT_UPDATE_BUFFER)]
    pub update_buffer: usize,

    /// First reconnect delay in milliseconds
    #[arg(
        long,
        env = "WORKER_RECONNECT_DELAY_MS",
        default_value_t = DEFAULT_RECONNECT_DELAY_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reconnect_delay_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    #[arg(
        long,
        env = "WORKER_RECONNECT_DELAY_MAX_MS",
        default_value_t = DEFAULT_RECONNECT_DELAY_MAX_MS
    )]
    pub reconnect_delay_max_ms: u64,

    /// Reconnect attempts before giving up (0 = never give up)
    #[arg(long, env = "WORKER_RECONNECT_ATTEMPTS", default_value_t = 0)]
    pub reconnect_attempts: u32,

    /// Log output: pretty or json
    #[arg(
        long,
        env = "WORKER_LOG_FORMAT",
        default_value = "pretty",
        value_parser = parse_log_format
    )]
    pub log_format: LogFormat,
}

impl WorkerConfig {
    pub fn cpu_interval(&self) -> Duration {
        Duration::from_millis(self.stat_cpu_interval_ms)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        // The ceiling never undercuts the first delay
        let max_delay_ms = self.reconnect_delay_max_ms.max(self.reconnect_delay_ms);
        ChannelConfig {
            url: self.orchestrator_url.clone(),
            backoff: BackoffConfig {
                base: Duration::from_millis(self.reconnect_delay_ms),
                max: Duration::from_millis(max_delay_ms),
                randomization: RECONNECT_RANDOMIZATION,
                max_attempts: (self.reconnect_attempts > 0).then_some(self.reconnect_attempts),
            },
            update_buffer: self.update_buffer,
        }
    }

    /// Non-empty allowlist, if configured
    pub fn env_allowlist(&self) -> Option<Vec<String>> {
        let keys: Vec<String> = self
            .env_allowlist
            .iter()
            .flatten()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        (!keys.is_empty()).then_some(keys)
    }

    /// Configured host, else the OS hostname, else `unknown`
    pub fn host_label(&self) -> String {
        self.host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(os_hostname)
            .unwrap_or_else(|| UNKNOWN_HOST.to_string())
    }
}

#[cfg(unix)]
fn os_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
}

#[cfg(not(unix))]
fn os_hostname() -> Option<String> {
    None
}
