//! Reconnect backoff
//!
//! delay = min(base * 2^attempt * (1 +/- randomization), max)

use rand::Rng;
use std::time::Duration;

use plexfarm_core::application::constants::{
    DEFAULT_RECONNECT_DELAY_MAX_MS, DEFAULT_RECONNECT_DELAY_MS, RECONNECT_RANDOMIZATION,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the delay applied as random jitter, in [0, 1]
    pub randomization: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MAX_MS),
            randomization: RECONNECT_RANDOMIZATION,
            max_attempts: None,
        }
    }
}

/// Exponential backoff with jitter, reset after every successful connection
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.config.max_attempts {
            if self.attempts >= max_attempts {
                return None;
            }
        }

        let factor = 2f64.powi(self.attempts.min(31) as i32);
        let exponential = self.config.base.as_millis() as f64 * factor;

        let r = self.config.randomization.clamp(0.0, 1.0);
        let jitter = rand::thread_rng().gen_range((1.0 - r)..=(1.0 + r));
        let delay_ms = (exponential * jitter).min(self.config.max.as_millis() as f64);

        self.attempts += 1;
        Some(Duration::from_millis(delay_ms as u64))
    }
}
