//! Idle period seam: the helper that grants idle time and the delegate
//! that decides whether it may.

use std::sync::{Mutex, RwLock, Weak};
use std::time::Duration;

use cadence_core::TimeTicks;
use serde::Serialize;
use tracing::debug;

/// Upper bound of a long idle period when nothing else caps it.
pub const MAXIMUM_LONG_IDLE_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongIdleDecision {
    Allowed,
    /// Refused; ask again after this delay.
    RetryAfter(Duration),
}

/// Implemented by whoever owns the policy for idle time.
pub trait IdleHelperDelegate: Send + Sync {
    fn can_enter_long_idle_period(&self, now: TimeTicks) -> LongIdleDecision;
    fn on_idle_period_started(&self);
    fn on_idle_period_ended(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePeriodState {
    NotInIdlePeriod,
    /// Between a commit and the next expected frame.
    InShortIdlePeriod,
    /// No frame expected soon; uncapped by frames.
    InLongIdlePeriod,
}

impl IdlePeriodState {
    pub fn is_idle(self) -> bool {
        self != IdlePeriodState::NotInIdlePeriod
    }
}

pub trait IdleHelper: Send + Sync {
    /// Start a short idle period lasting until `deadline`.
    fn start_idle_period(&self, now: TimeTicks, deadline: TimeTicks);
    fn end_idle_period(&self);
    /// Try to start a long idle period, consulting the delegate.
    fn enable_long_idle_period(&self, now: TimeTicks) -> LongIdleDecision;
    fn idle_period_state(&self) -> IdlePeriodState;
    fn current_idle_deadline(&self) -> Option<TimeTicks>;
}

#[derive(Debug)]
struct TrackerState {
    state: IdlePeriodState,
    deadline: Option<TimeTicks>,
    retry_long_idle_at: Option<TimeTicks>,
}

/// Idle helper that only tracks the idle period state machine.
///
/// It does not run idle tasks; it tells the delegate when idle periods
/// begin and end, and remembers when a refused long idle period may be
/// retried.
pub struct IdlePeriodTracker {
    delegate: RwLock<Option<Weak<dyn IdleHelperDelegate>>>,
    state: Mutex<TrackerState>,
}

impl Default for IdlePeriodTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IdlePeriodTracker {
    pub fn new() -> Self {
        Self {
            delegate: RwLock::new(None),
            state: Mutex::new(TrackerState {
                state: IdlePeriodState::NotInIdlePeriod,
                deadline: None,
                retry_long_idle_at: None,
            }),
        }
    }

    pub fn set_delegate(&self, delegate: Weak<dyn IdleHelperDelegate>) {
        *self.delegate.write().unwrap() = Some(delegate);
    }

    /// When a refused long idle period should be attempted again.
    pub fn retry_long_idle_at(&self) -> Option<TimeTicks> {
        self.state.lock().unwrap().retry_long_idle_at
    }

    fn delegate(&self) -> Option<std::sync::Arc<dyn IdleHelperDelegate>> {
        self.delegate.read().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// Move to `next`, then notify the delegate outside the lock.
    fn transition(&self, next: IdlePeriodState, deadline: Option<TimeTicks>) {
        let previous = {
            let mut state = self.state.lock().unwrap();
            let previous = state.state;
            state.state = next;
            state.deadline = deadline;
            previous
        };
        if previous == next {
            return;
        }
        debug!(?previous, ?next, "idle period state changed");
        let Some(delegate) = self.delegate() else {
            return;
        };
        if !previous.is_idle() && next.is_idle() {
            delegate.on_idle_period_started();
        } else if previous.is_idle() && !next.is_idle() {
            delegate.on_idle_period_ended();
        }
    }
}

impl IdleHelper for IdlePeriodTracker {
    fn start_idle_period(&self, now: TimeTicks, deadline: TimeTicks) {
        if deadline <= now {
            return;
        }
        self.transition(IdlePeriodState::InShortIdlePeriod, Some(deadline));
    }

    fn end_idle_period(&self) {
        self.transition(IdlePeriodState::NotInIdlePeriod, None);
    }

    fn enable_long_idle_period(&self, now: TimeTicks) -> LongIdleDecision {
        let decision = match self.delegate() {
            Some(delegate) => delegate.can_enter_long_idle_period(now),
            None => LongIdleDecision::Allowed,
        };
        match decision {
            LongIdleDecision::Allowed => {
                self.state.lock().unwrap().retry_long_idle_at = None;
                self.transition(
                    IdlePeriodState::InLongIdlePeriod,
                    Some(now + MAXIMUM_LONG_IDLE_PERIOD),
                );
            }
            LongIdleDecision::RetryAfter(delay) => {
                self.state.lock().unwrap().retry_long_idle_at = Some(now + delay);
                self.transition(IdlePeriodState::NotInIdlePeriod, None);
            }
        }
        decision
    }

    fn idle_period_state(&self) -> IdlePeriodState {
        self.state.lock().unwrap().state
    }

    fn current_idle_deadline(&self) -> Option<TimeTicks> {
        self.state.lock().unwrap().deadline
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct MockDelegate {
        allow: bool,
        started: AtomicUsize,
        ended: AtomicUsize,
    }

    impl MockDelegate {
        fn new(allow: bool) -> Arc<Self> {
            Arc::new(Self {
                allow,
                started: AtomicUsize::new(0),
                ended: AtomicUsize::new(0),
            })
        }
    }

    impl IdleHelperDelegate for MockDelegate {
        fn can_enter_long_idle_period(&self, _now: TimeTicks) -> LongIdleDecision {
            if self.allow {
                LongIdleDecision::Allowed
            } else {
                LongIdleDecision::RetryAfter(Duration::from_millis(30))
            }
        }

        fn on_idle_period_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_idle_period_ended(&self) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracker_with(delegate: &Arc<MockDelegate>) -> IdlePeriodTracker {
        let tracker = IdlePeriodTracker::new();
        let as_dyn: Arc<dyn IdleHelperDelegate> = delegate.clone();
        tracker.set_delegate(Arc::downgrade(&as_dyn));
        tracker
    }

    #[test]
    fn short_idle_period_notifies_start_and_end_once() {
        let delegate = MockDelegate::new(true);
        let tracker = tracker_with(&delegate);
        let now = TimeTicks::from_millis(10);

        tracker.start_idle_period(now, TimeTicks::from_millis(16));
        tracker.start_idle_period(now, TimeTicks::from_millis(16));
        assert_eq!(tracker.idle_period_state(), IdlePeriodState::InShortIdlePeriod);
        assert_eq!(tracker.current_idle_deadline(), Some(TimeTicks::from_millis(16)));

        tracker.end_idle_period();
        tracker.end_idle_period();
        assert_eq!(delegate.started.load(Ordering::SeqCst), 1);
        assert_eq!(delegate.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn past_deadline_does_not_start_idle() {
        let delegate = MockDelegate::new(true);
        let tracker = tracker_with(&delegate);
        tracker.start_idle_period(TimeTicks::from_millis(20), TimeTicks::from_millis(16));
        assert_eq!(tracker.idle_period_state(), IdlePeriodState::NotInIdlePeriod);
        assert_eq!(delegate.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn long_idle_period_allowed() {
        let delegate = MockDelegate::new(true);
        let tracker = tracker_with(&delegate);
        let now = TimeTicks::from_millis(100);
        assert_eq!(tracker.enable_long_idle_period(now), LongIdleDecision::Allowed);
        assert_eq!(tracker.idle_period_state(), IdlePeriodState::InLongIdlePeriod);
        assert_eq!(tracker.current_idle_deadline(), Some(now + MAXIMUM_LONG_IDLE_PERIOD));
    }

    #[test]
    fn long_idle_period_refused_records_retry() {
        let delegate = MockDelegate::new(false);
        let tracker = tracker_with(&delegate);
        let now = TimeTicks::from_millis(100);
        assert_eq!(
            tracker.enable_long_idle_period(now),
            LongIdleDecision::RetryAfter(Duration::from_millis(30))
        );
        assert_eq!(tracker.idle_period_state(), IdlePeriodState::NotInIdlePeriod);
        assert_eq!(tracker.retry_long_idle_at(), Some(TimeTicks::from_millis(130)));
        assert_eq!(delegate.started.load(Ordering::SeqCst), 0);
    }
}
