// CPU probe implementation
// reason: sysinfo for cross-platform CPU counters
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

use plexfarm_core::port::cpu_probe::{CpuProbe, ProbeError};

/// CPU probe backed by sysinfo
///
/// Usage is the delta between two counter refreshes taken one window apart.
pub struct SysinfoCpuProbe {
    system: Arc<Mutex<System>>,
}

impl SysinfoCpuProbe {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn refresh(&self) -> Result<f32, ProbeError> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| ProbeError::Unavailable("probe state poisoned".to_string()))?;
        sys.refresh_cpu();

        if sys.cpus().is_empty() {
            return Err(ProbeError::Unavailable("no CPUs reported".to_string()));
        }
        Ok(sys.global_cpu_info().cpu_usage())
    }
}

impl Default for SysinfoCpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CpuProbe for SysinfoCpuProbe {
    async fn sample(&self, window: Duration) -> Result<f32, ProbeError> {
        // Baseline counters, then measure across the window
        self.refresh()?;
        tokio::time::sleep(window.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
        let usage = self.refresh()?;

        if !usage.is_finite() {
            return Err(ProbeError::Unavailable(format!("bad reading {}", usage)));
        }

        debug!(cpu = %usage, window_ms = window.as_millis() as u64, "CPU usage measured");
        Ok(usage.clamp(0.0, 100.0))
    }
}
