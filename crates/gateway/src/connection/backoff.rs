use rand::Rng;
use std::time::Duration;

use crate::transport::config::ReconnectConfig;

const JITTER_FRACTION: f64 = 0.2;

/// Exponential reconnect backoff, capped at `max_delay`
///
/// `delay(n) = min(initial * multiplier^(n-1), max)`, optionally randomised by
/// ±20% and clamped again so the cap always holds.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether attempt number `attempt` (1-based) may run
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.config.max_attempts == 0 || attempt <= self.config.max_attempts
    }

    /// Delay before attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_ms = self.config.max_delay_ms as f64;
        let exponent = attempt.saturating_sub(1).min(1_000) as i32;
        let base = self.config.initial_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let mut delay_ms = base.min(max_ms);

        if self.config.jitter {
            let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
            delay_ms = (delay_ms * factor).min(max_ms);
        }

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}
