//! Time source for the control loop.
//!
//! The controller only ever asks two things of time: how many milliseconds
//! have passed since boot (cooldown and settle windows) and how long to wait
//! before the next tick. Both go through `Clock` so tests can drive them.

use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    /// Block the loop between ticks.
    fn sleep(&self, d: Duration);

    /// Whole milliseconds since `epoch`; 0 if `epoch` lies in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let elapsed = self.now().saturating_duration_since(epoch);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock pacing for a running node.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, Instant};

    use super::Clock;

    /// Millisecond clock that only moves when told to.
    ///
    /// Every clone reads the same counter: hand one to the controller, keep
    /// one in the test and step through cooldowns without waiting. `sleep`
    /// advances the counter, so a paced node loop runs instantly.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        boot: Instant,
        elapsed_ms: Arc<AtomicU64>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                boot: Instant::now(),
                elapsed_ms: Arc::new(AtomicU64::new(0)),
            }
        }

        pub fn advance_ms(&self, ms: u64) {
            // fetch_add wraps; saturate instead.
            let _ = self
                .elapsed_ms
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                    Some(t.saturating_add(ms))
                });
        }

        pub fn elapsed_ms(&self) -> u64 {
            self.elapsed_ms.load(Ordering::Acquire)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.boot + Duration::from_millis(self.elapsed_ms())
        }

        fn sleep(&self, d: Duration) {
            self.advance_ms(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        }
    }

}
