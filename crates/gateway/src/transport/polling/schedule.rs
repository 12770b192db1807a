use beacon_core::SubscriptionKey;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::time::Duration;
use tokio::time::Instant;

/// Poll queue ordered by next due instant (earliest first)
///
/// A key is rescheduled at the moment it is taken, so removing it while its
/// poll is still in flight keeps it removed.
pub struct PollSchedule {
    queue: PriorityQueue<SubscriptionKey, Reverse<Instant>>,
    interval: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            queue: PriorityQueue::new(),
            interval,
        }
    }

    /// Schedule `key` for its first poll at `first_due`.
    ///
    /// Returns false if the key was already scheduled (its due time is kept).
    pub fn insert(&mut self, key: SubscriptionKey, first_due: Instant) -> bool {
        if self.queue.get(&key).is_some() {
            return false;
        }
        self.queue.push(key, Reverse(first_due));
        true
    }

    pub fn remove(&mut self, key: &SubscriptionKey) -> bool {
        self.queue.remove(key).is_some()
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.queue.get(key).is_some()
    }

    /// Earliest due instant, if anything is scheduled
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.peek().map(|(_, Reverse(due))| *due)
    }

    /// Take every key due at `now` and push each one interval forward.
    ///
    /// A key that fell more than one interval behind is rescheduled from
    /// `now` instead of bursting to catch up.
    pub fn take_due(&mut self, now: Instant) -> Vec<SubscriptionKey> {
        let mut due_keys = Vec::new();
        while let Some((_, Reverse(due))) = self.queue.peek() {
            if *due > now {
                break;
            }
            let Some((key, Reverse(due))) = self.queue.pop() else {
                break;
            };
            due_keys.push((key, due));
        }

        for (key, due) in &due_keys {
            let mut next = *due + self.interval;
            if next <= now {
                next = now + self.interval;
            }
            self.queue.push(key.clone(), Reverse(next));
        }

        due_keys.into_iter().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::Channel;

    fn key(channel: Channel) -> SubscriptionKey {
        SubscriptionKey::channel(channel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_orders_by_due_time() {
        let now = Instant::now();
        let mut schedule = PollSchedule::new(Duration::from_secs(8));
        schedule.insert(key(Channel::Defi), now + Duration::from_secs(2));
        schedule.insert(key(Channel::Market), now);
        schedule.insert(key(Channel::Prices), now + Duration::from_secs(1));

        assert_eq!(schedule.next_due(), Some(now));
        assert_eq!(schedule.take_due(now), vec![key(Channel::Market)]);
        assert_eq!(
            schedule.take_due(now + Duration::from_secs(2)),
            vec![key(Channel::Prices), key(Channel::Defi)]
        );
        assert_eq!(schedule.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedules_at_fixed_interval() {
        let now = Instant::now();
        let interval = Duration::from_secs(8);
        let mut schedule = PollSchedule::new(interval);
        schedule.insert(key(Channel::Prices), now + Duration::from_secs(1));

        schedule.take_due(now + Duration::from_secs(1));
        assert_eq!(schedule.next_due(), Some(now + Duration::from_secs(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_key_does_not_burst() {
        let now = Instant::now();
        let interval = Duration::from_secs(8);
        let mut schedule = PollSchedule::new(interval);
        schedule.insert(key(Channel::Nft), now);

        let late = now + Duration::from_secs(30);
        assert_eq!(schedule.take_due(late).len(), 1);
        assert_eq!(schedule.next_due(), Some(late + interval));
        assert!(schedule.take_due(late).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_insert_keeps_due_time() {
        let now = Instant::now();
        let mut schedule = PollSchedule::new(Duration::from_secs(8));
        assert!(schedule.insert(key(Channel::GameFi), now + Duration::from_secs(4)));
        assert!(!schedule.insert(key(Channel::GameFi), now));
        assert_eq!(schedule.next_due(), Some(now + Duration::from_secs(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let now = Instant::now();
        let mut schedule = PollSchedule::new(Duration::from_secs(8));
        schedule.insert(key(Channel::Market), now);
        assert!(schedule.remove(&key(Channel::Market)));
        assert!(!schedule.remove(&key(Channel::Market)));
        assert!(schedule.is_empty());
        assert_eq!(schedule.next_due(), None);
    }
}
