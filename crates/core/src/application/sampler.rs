// Capability Sampler - periodic CPU measurement
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::shutdown::ShutdownToken;
use crate::domain::{WorkerEvent, WorkerEventSender};
use crate::port::CpuProbe;

/// Measures CPU utilization every `interval` over a window of the same length
/// and hands each reading to the supervisor loop.
pub struct CapabilitySampler {
    probe: Arc<dyn CpuProbe>,
    interval: Duration,
}

impl CapabilitySampler {
    pub fn new(probe: Arc<dyn CpuProbe>, interval: Duration) -> Self {
        Self { probe, interval }
    }

    /// Sample until shutdown or until the supervisor loop is gone
    pub async fn run(self, events: WorkerEventSender, mut shutdown: ShutdownToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "CPU sampler started");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let reading = tokio::select! {
                _ = shutdown.wait() => break,
                reading = async {
                    ticker.tick().await;
                    self.sample_once().await
                } => reading,
            };

            // Failed samples keep the previous reading
            if let Some(percent) = reading {
                if events.send(WorkerEvent::CpuSample(percent)).is_err() {
                    debug!("Supervisor gone, CPU sampler exiting");
                    break;
                }
            }
        }

        info!("CPU sampler stopped");
    }

    /// One measurement; `None` when the probe fails
    pub async fn sample_once(&self) -> Option<f32> {
        match self.probe.sample(self.interval).await {
            Ok(percent) => {
                debug!(cpu = percent, "CPU sampled");
                Some(percent)
            }
            Err(e) => {
                debug!(error = %e, "CPU sample skipped");
                None
            }
        }
    }
}
