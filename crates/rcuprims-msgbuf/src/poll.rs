//! Time source and bounded polling.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source used for polling.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time via [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on. Sleeping returns immediately.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// When a [`Poller`] gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollLimit {
    /// Stop once this much clock time has passed.
    Deadline(Duration),
    /// Stop after this many unsuccessful checks.
    Attempts(u32),
}

/// Outcome of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    Expired,
}

/// Repeats a check with a fixed sleep until it succeeds or a limit is hit.
pub struct Poller<'c> {
    clock: &'c dyn Clock,
    interval: Duration,
    limit: PollLimit,
}

impl<'c> Poller<'c> {
    pub fn new(clock: &'c dyn Clock, interval: Duration, limit: PollLimit) -> Self {
        Self {
            clock,
            interval,
            limit,
        }
    }

    /// Run `check` until it returns `true` or the limit expires. Errors from
    /// `check` end the poll immediately.
    pub fn run<E>(&self, mut check: impl FnMut() -> Result<bool, E>) -> Result<PollOutcome, E> {
        let start = self.clock.now();
        let mut attempts = 0u32;
        loop {
            if check()? {
                return Ok(PollOutcome::Ready);
            }
            attempts = attempts.saturating_add(1);
            let expired = match self.limit {
                PollLimit::Deadline(timeout) => {
                    self.clock.now().saturating_sub(start) >= timeout
                }
                PollLimit::Attempts(max) => attempts >= max,
            };
            if expired {
                return Ok(PollOutcome::Expired);
            }
            self.clock.sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_on_first_check() {
        let clock = ManualClock::new();
        let poller = Poller::new(
            &clock,
            Duration::from_millis(1),
            PollLimit::Deadline(Duration::from_secs(1)),
        );
        let outcome = poller.run(|| Ok::<_, ()>(true)).unwrap();
        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn deadline_expires_on_manual_clock() {
        let clock = ManualClock::new();
        let poller = Poller::new(
            &clock,
            Duration::from_millis(10),
            PollLimit::Deadline(Duration::from_millis(100)),
        );
        let mut checks = 0;
        let outcome = poller
            .run(|| {
                checks += 1;
                Ok::<_, ()>(false)
            })
            .unwrap();
        assert_eq!(outcome, PollOutcome::Expired);
        assert_eq!(checks, 11);
        assert_eq!(clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn attempts_limit() {
        let clock = ManualClock::new();
        let poller = Poller::new(&clock, Duration::ZERO, PollLimit::Attempts(5));
        let mut checks = 0;
        let outcome = poller
            .run(|| {
                checks += 1;
                Ok::<_, ()>(checks == 3)
            })
            .unwrap();
        assert_eq!(outcome, PollOutcome::Ready);

        checks = 0;
        let outcome = poller
            .run(|| {
                checks += 1;
                Ok::<_, ()>(false)
            })
            .unwrap();
        assert_eq!(outcome, PollOutcome::Expired);
        assert_eq!(checks, 5);
    }

    #[test]
    fn check_error_stops_poll() {
        let clock = ManualClock::new();
        let poller = Poller::new(&clock, Duration::ZERO, PollLimit::Attempts(100));
        let result = poller.run(|| Err::<bool, _>("boom"));
        assert_eq!(result, Err("boom"));
    }
}
