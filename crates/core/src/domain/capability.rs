// Capability reading and stats response

use serde::{Deserialize, Serialize};

/// Reported before the first successful sample.
///
/// Deliberately outside [0, 100] so the orchestrator never reads startup
/// latency as an idle worker.
pub const CPU_UNMEASURED: f64 = 9999.0;

/// Latest CPU utilization percentage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuReading(f64);

impl CpuReading {
    pub fn unmeasured() -> Self {
        Self(CPU_UNMEASURED)
    }

    /// Round to two decimals and clamp into [0, 100]
    pub fn measured(percent: f32) -> Self {
        let clamped = f64::from(percent).clamp(0.0, 100.0);
        Self((clamped * 100.0).round() / 100.0)
    }

    pub fn is_measured(&self) -> bool {
        self.0 != CPU_UNMEASURED
    }

    pub fn percent(&self) -> f64 {
        self.0
    }
}

impl Default for CpuReading {
    fn default() -> Self {
        Self::unmeasured()
    }
}

/// worker.stats acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub cpu: f64,
    pub tasks: usize,
}
