// CPU utilization port
// reason: async-trait, sampling waits for the measurement window
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("CPU statistics unavailable: {0}")]
    Unavailable(String),
}

/// Measures global CPU utilization
#[async_trait]
pub trait CpuProbe: Send + Sync {
    /// Measure utilization over `window`
    ///
    /// # Returns
    /// Percentage in [0, 100]
    ///
    /// # Errors
    /// - ProbeError::Unavailable if the platform gives no usable counters
    async fn sample(&self, window: Duration) -> Result<f32, ProbeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of results, then keeps failing
    pub struct FixedCpuProbe {
        results: Mutex<VecDeque<Result<f32, ProbeError>>>,
    }

    impl FixedCpuProbe {
        pub fn new(results: Vec<Result<f32, ProbeError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
            }
        }
    }

    #[async_trait]
    impl CpuProbe for FixedCpuProbe {
        async fn sample(&self, _window: Duration) -> Result<f32, ProbeError> {
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProbeError::Unavailable("exhausted".to_string())))
        }
    }
}
