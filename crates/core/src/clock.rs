//! Monotonic tick clock used by every estimator and the scheduler.
//!
//! Nothing in the scheduler reads a global "now". Callers inject a
//! [`TickClock`]: [`DefaultTickClock`] in production, [`TestTickClock`] in
//! tests and trace replay.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A point on a monotonic clock, stored as the offset from the clock origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeTicks(Duration);

impl TimeTicks {
    pub const ZERO: TimeTicks = TimeTicks(Duration::ZERO);

    pub const fn from_duration(since_origin: Duration) -> Self {
        Self(since_origin)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs))
    }

    /// Offset from the clock origin.
    pub const fn since_origin(self) -> Duration {
        self.0
    }

    /// `self - earlier`, or zero if `earlier` is later than `self`.
    pub fn saturating_duration_since(self, earlier: TimeTicks) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub fn checked_sub(self, delta: Duration) -> Option<TimeTicks> {
        self.0.checked_sub(delta).map(TimeTicks)
    }
}

impl Add<Duration> for TimeTicks {
    type Output = TimeTicks;

    fn add(self, rhs: Duration) -> TimeTicks {
        TimeTicks(self.0 + rhs)
    }
}

impl AddAssign<Duration> for TimeTicks {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl Sub for TimeTicks {
    type Output = Duration;

    /// Saturates at zero; monotonic time never runs backwards for callers.
    fn sub(self, rhs: TimeTicks) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for TimeTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.0.as_secs_f64() * 1000.0)
    }
}

/// Source of monotonic time.
pub trait TickClock: Send + Sync {
    fn now_ticks(&self) -> TimeTicks;
}

/// Wall clock backed by [`Instant`], with its origin at construction.
#[derive(Debug, Clone)]
pub struct DefaultTickClock {
    origin: Instant,
}

impl DefaultTickClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for DefaultTickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for DefaultTickClock {
    fn now_ticks(&self) -> TimeTicks {
        TimeTicks(self.origin.elapsed())
    }
}

/// Manually driven clock. Time only moves when told to.
#[derive(Debug, Default)]
pub struct TestTickClock {
    nanos: AtomicU64,
}

impl TestTickClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: TimeTicks) -> Self {
        let clock = Self::new();
        clock.set(now);
        clock
    }

    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Jump to `now`. Moving backwards is ignored.
    pub fn set(&self, now: TimeTicks) {
        self.nanos
            .fetch_max(now.since_origin().as_nanos() as u64, Ordering::SeqCst);
    }
}

impl TickClock for TestTickClock {
    fn now_ticks(&self) -> TimeTicks {
        TimeTicks(Duration::from_nanos(self.nanos.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtraction_saturates() {
        let early = TimeTicks::from_millis(10);
        let late = TimeTicks::from_millis(25);
        assert_eq!(late - early, Duration::from_millis(15));
        assert_eq!(early - late, Duration::ZERO);
    }

    #[test]
    fn test_clock_advances_and_never_rewinds() {
        let clock = TestTickClock::starting_at(TimeTicks::from_millis(5));
        clock.advance(Duration::from_millis(20));
        assert_eq!(clock.now_ticks(), TimeTicks::from_millis(25));

        clock.set(TimeTicks::from_millis(1));
        assert_eq!(clock.now_ticks(), TimeTicks::from_millis(25));
    }

    #[test]
    fn default_clock_is_monotonic() {
        let clock = DefaultTickClock::new();
        let a = clock.now_ticks();
        let b = clock.now_ticks();
        assert!(b >= a);
    }
}
