use beacon_core::Timestamp;
use beacon_ports::Clock;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Clock that only moves when told to
///
/// Used by cache and snapshot tests so TTL expiry is deterministic.
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock
    ///
    /// # Arguments
    /// * `initial_time` - Optional starting time. If None, uses current wall time.
    pub fn new(initial_time: Option<Timestamp>) -> Arc<Self> {
        Arc::new(Self {
            current_time: RwLock::new(initial_time.unwrap_or_else(Utc::now)),
        })
    }

    /// Advance the clock by a specified duration
    pub fn advance(&self, duration: Duration) {
        *self.current_time.write() += duration;
    }

    /// Advance the clock by a std duration (convenience for TTL tests)
    pub fn advance_std(&self, duration: std::time::Duration) {
        let delta = Duration::from_std(duration).unwrap_or(Duration::MAX);
        self.advance(delta);
    }

    /// Explicitly set the time
    pub fn set_time(&self, time: Timestamp) {
        *self.current_time.write() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current_time.read()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_is_frozen() {
        let clock = ManualClock::new(None);
        let time1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(clock.now(), time1);
    }

    #[test]
    fn test_advance() {
        let clock = ManualClock::new(None);
        let start = clock.now();

        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now() - start, Duration::seconds(5));

        clock.advance_std(std::time::Duration::from_millis(250));
        assert_eq!(clock.now() - start, Duration::milliseconds(5250));
    }
}
