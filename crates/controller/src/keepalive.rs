use std::time::{Duration, Instant};

/// Tracks the last publish and the last detection activity so the
/// controller can emit a periodic liveness "clear" when both have gone
/// quiet.
///
/// Evaluated every cycle regardless of pipeline state; COOLDOWN does not
/// suppress it.
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveClock {
    last_publish: Instant,
    last_activity: Instant,
}

impl KeepaliveClock {
    pub fn new(now: Instant) -> Self {
        Self {
            last_publish: now,
            last_activity: now,
        }
    }

    /// Call on every publish, keepalive or otherwise.
    pub fn mark_publish(&mut self, now: Instant) {
        self.last_publish = now;
    }

    /// Call on every cycle with a non-zero detection count.
    pub fn mark_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Due iff BOTH the time since the last publish and the time since the
    /// last detection activity exceed the interval.
    pub fn due(&self, now: Instant, interval: Duration) -> bool {
        now.duration_since(self.last_publish) > interval
            && now.duration_since(self.last_activity) > interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(300);

    #[test]
    fn not_due_before_interval() {
        let now = Instant::now();
        let clock = KeepaliveClock::new(now);
        assert!(!clock.due(now + Duration::from_secs(299), INTERVAL));
        assert!(!clock.due(now + INTERVAL, INTERVAL), "boundary is not due");
    }

    #[test]
    fn due_after_interval_of_total_silence() {
        let now = Instant::now();
        let clock = KeepaliveClock::new(now);
        assert!(clock.due(now + Duration::from_secs(301), INTERVAL));
    }

    #[test]
    fn recent_activity_defers_keepalive() {
        let now = Instant::now();
        let mut clock = KeepaliveClock::new(now);
        clock.mark_activity(now + Duration::from_secs(200));

        // Publish is stale but activity is not.
        assert!(!clock.due(now + Duration::from_secs(400), INTERVAL));
        assert!(clock.due(now + Duration::from_secs(501), INTERVAL));
    }

    #[test]
    fn epoch_at_loop_start_defers_the_first_keepalive() {
        // A clock created when the detection loop starts is never due
        // before a full interval from that point, regardless of how much
        // wall time startup consumed beforehand.
        let loop_start = Instant::now() + Duration::from_secs(3600);
        let clock = KeepaliveClock::new(loop_start);
        assert!(!clock.due(loop_start, INTERVAL));
        assert!(!clock.due(loop_start + INTERVAL, INTERVAL));
        assert!(clock.due(loop_start + INTERVAL + Duration::from_secs(1), INTERVAL));
    }

    #[test]
    fn exactly_one_keepalive_per_silent_interval() {
        let now = Instant::now();
        let mut clock = KeepaliveClock::new(now);

        let mut publishes = 0;
        // Simulate 1 Hz cycles over ~3 intervals of silence.
        for s in 1..=905 {
            let t = now + Duration::from_secs(s);
            if clock.due(t, INTERVAL) {
                publishes += 1;
                clock.mark_publish(t);
            }
        }
        assert_eq!(publishes, 3);
    }
}
