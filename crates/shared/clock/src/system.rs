use beacon_core::Timestamp;
use beacon_ports::Clock;
use chrono::Utc;

/// Wall-clock time, used by the runner for cache ages and snapshot timestamps
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
