use std::time::{Duration, Instant};

/// Default polling interval of the Airthings cloud API
pub const SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Minimum-interval gate.
///
/// A call is allowed when nothing has run yet or more than `interval` has
/// passed since the last successful run. Callers `mark` only after the
/// guarded work succeeded, so a failed attempt can be retried immediately.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(SCAN_INTERVAL)
    }
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Instant::now())
    }

    pub fn is_ready_at(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(_) if self.interval.is_zero() => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    pub fn mark(&mut self) {
        self.mark_at(Instant::now());
    }

    pub fn mark_at(&mut self, now: Instant) {
        self.last_run = Some(now);
    }
}
