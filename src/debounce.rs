//! Trailing-edge debouncing for continuous controls

use std::time::{Duration, Instant};

/// Default quiet period before a value is sent
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Collapses a burst of values into the last one
///
/// Every [`push`](Debouncer::push) restarts the quiet period. Once it has
/// elapsed, [`poll`](Debouncer::poll) hands out the latest value exactly once.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    /// Take the value if its quiet period is over
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.pending {
            Some((_, due)) if now >= due => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    /// Take the pending value regardless of the deadline
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// When the pending value becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_emits_last_value_once() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        for (i, value) in [10, 35, 60, 72].into_iter().enumerate() {
            let at = start + Duration::from_millis(50 * i as u64);
            debouncer.push(value, at);
            assert_eq!(debouncer.poll(at), None);
        }

        let last_push = start + Duration::from_millis(150);
        assert_eq!(debouncer.poll(last_push + Duration::from_millis(299)), None);
        assert_eq!(debouncer.poll(last_push + Duration::from_millis(300)), Some(72));
        assert_eq!(debouncer.poll(last_push + Duration::from_secs(5)), None);
        assert!(debouncer.is_idle());
    }

    #[test]
    fn test_flush_and_cancel() {
        let now = Instant::now();
        let mut debouncer = Debouncer::default();
        debouncer.push("a", now);
        assert_eq!(debouncer.deadline(), Some(now + DEFAULT_DEBOUNCE));
        assert_eq!(debouncer.flush(), Some("a"));

        debouncer.push("b", now);
        debouncer.cancel();
        assert_eq!(debouncer.poll(now + Duration::from_secs(1)), None);
    }
}
