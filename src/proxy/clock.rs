//! Time sources for the reload wait

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Time source used by the proxy handler
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug)]
struct FakeState {
    now: Instant,
    watchers: usize,
}

/// Manually driven clock. `sleep` blocks until another thread moves
/// virtual time past the deadline.
#[derive(Debug)]
pub struct FakeClock {
    state: Mutex<FakeState>,
    changed: Condvar,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl FakeClock {
    /// Create a fake clock frozen at `now`
    pub fn new(now: Instant) -> Self {
        Self {
            state: Mutex::new(FakeState { now, watchers: 0 }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A panicking sleeper cannot leave the state inconsistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advance virtual time and wake sleepers whose deadline passed
    pub fn increment(&self, duration: Duration) {
        let mut state = self.lock();
        state.now += duration;
        self.changed.notify_all();
    }

    /// Number of threads currently blocked in `sleep`
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers
    }

    /// Wait until at least one thread sleeps on this clock, then advance
    pub fn wait_for_watcher_and_increment(&self, duration: Duration) {
        let mut state = self.lock();
        while state.watchers == 0 {
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.now += duration;
        self.changed.notify_all();
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        let deadline = state.now + duration;

        state.watchers += 1;
        self.changed.notify_all();
        while state.now < deadline {
            state = self.changed.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.watchers -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fake_clock_increment_moves_now() {
        let start = Instant::now();
        let clock = FakeClock::new(start);
        clock.increment(Duration::from_secs(3));
        assert_eq!(clock.now(), start + Duration::from_secs(3));
    }

    #[test]
    fn test_fake_sleep_blocks_until_advanced() {
        let clock = Arc::new(FakeClock::default());
        let (tx, rx) = mpsc::channel();

        let sleeper = Arc::clone(&clock);
        thread::spawn(move || {
            sleeper.sleep(Duration::from_secs(1));
            tx.send(()).unwrap();
        });

        clock.wait_for_watcher_and_increment(Duration::from_millis(500));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        clock.increment(Duration::from_millis(500));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(clock.watcher_count(), 0);
    }

    #[test]
    fn test_zero_sleep_returns_immediately() {
        let clock = FakeClock::default();
        clock.sleep(Duration::ZERO);
        assert_eq!(clock.watcher_count(), 0);
    }
}
