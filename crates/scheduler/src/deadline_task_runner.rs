use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use cadence_core::TimeTicks;
use tracing::trace;

use crate::queue::TaskRunner;

struct State {
    deadline: Option<TimeTicks>,
    /// Bumped on every reschedule; a posted task only fires if it still
    /// carries the current generation.
    generation: u64,
}

struct Inner {
    callback: Box<dyn Fn() + Send + Sync>,
    state: Mutex<State>,
}

impl Inner {
    fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation || state.deadline.is_none() {
                return;
            }
            state.deadline = None;
        }
        (self.callback)();
    }
}

/// Runs a callback by the earliest deadline requested so far.
///
/// At most one post is outstanding. A later deadline than the pending one is
/// ignored; an earlier one supersedes it.
pub struct DeadlineTaskRunner {
    inner: Arc<Inner>,
    task_runner: TaskRunner,
}

impl fmt::Debug for DeadlineTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineTaskRunner")
            .field("deadline", &self.pending_deadline())
            .field("task_runner", &self.task_runner)
            .finish()
    }
}

impl DeadlineTaskRunner {
    pub fn new(callback: impl Fn() + Send + Sync + 'static, task_runner: TaskRunner) -> Self {
        Self {
            inner: Arc::new(Inner {
                callback: Box::new(callback),
                state: Mutex::new(State {
                    deadline: None,
                    generation: 0,
                }),
            }),
            task_runner,
        }
    }

    /// Ensure the callback runs no later than `now + delay`.
    #[track_caller]
    pub fn set_deadline(&self, delay: Duration, now: TimeTicks) {
        self.set_deadline_from(Location::caller(), delay, now);
    }

    pub fn set_deadline_from(
        &self,
        location: &'static Location<'static>,
        delay: Duration,
        now: TimeTicks,
    ) {
        let deadline = now + delay;
        let generation = {
            let mut state = self.inner.state.lock().unwrap();
            if state.deadline.is_some_and(|pending| pending <= deadline) {
                return;
            }
            state.deadline = Some(deadline);
            state.generation += 1;
            state.generation
        };
        trace!(from = %location, delay_ms = delay.as_millis() as u64, "deadline set");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.task_runner.post_delayed_task_from(
            location,
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire(generation);
                }
            },
            delay,
        );
    }

    /// Drop any pending deadline without running the callback.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.deadline = None;
        state.generation += 1;
    }

    pub fn pending_deadline(&self) -> Option<TimeTicks> {
        self.inner.state.lock().unwrap().deadline
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cadence_core::{TestTickClock, TickClock};

    use super::*;
    use crate::queue::TaskQueueManager;
    use crate::queue_manager::SimpleTaskQueueManager;

    struct Fixture {
        clock: Arc<TestTickClock>,
        manager: Arc<SimpleTaskQueueManager>,
        runner: DeadlineTaskRunner,
        run_times: Arc<Mutex<Vec<TimeTicks>>>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(TestTickClock::starting_at(TimeTicks::from_millis(1000)));
        let manager = Arc::new(SimpleTaskQueueManager::new(clock.clone()));
        let queue = manager.new_queue("control");
        let run_times = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&run_times);
        let callback_clock = clock.clone();
        let runner = DeadlineTaskRunner::new(
            move || sink.lock().unwrap().push(callback_clock.now_ticks()),
            TaskRunner::new(manager.clone(), queue),
        );
        Fixture {
            clock,
            manager,
            runner,
            run_times,
        }
    }

    impl Fixture {
        fn now(&self) -> TimeTicks {
            self.clock.now_ticks()
        }

        /// Advance the clock through every pending delayed task.
        fn run_pending(&self) {
            self.manager.run_until_idle();
            while let Some(delay) = self.manager.next_pending_delay() {
                self.clock.advance(delay);
                self.manager.run_until_idle();
            }
        }
    }

    #[test]
    fn fires_once_at_deadline() {
        let f = fixture();
        let start = f.now();
        f.runner.set_deadline(Duration::from_millis(10), start);
        f.run_pending();
        assert_eq!(*f.run_times.lock().unwrap(), vec![start + Duration::from_millis(10)]);
        assert_eq!(f.runner.pending_deadline(), None);
    }

    #[test]
    fn later_deadline_is_ignored() {
        let f = fixture();
        let start = f.now();
        f.runner.set_deadline(Duration::from_millis(10), start);
        f.runner.set_deadline(Duration::from_millis(100), start);
        f.run_pending();
        assert_eq!(*f.run_times.lock().unwrap(), vec![start + Duration::from_millis(10)]);
    }

    #[test]
    fn earlier_deadline_supersedes() {
        let f = fixture();
        let start = f.now();
        f.runner.set_deadline(Duration::from_millis(100), start);
        f.runner.set_deadline(Duration::from_millis(10), start);
        f.run_pending();
        assert_eq!(*f.run_times.lock().unwrap(), vec![start + Duration::from_millis(10)]);
    }

    #[test]
    fn equal_deadline_is_a_no_op() {
        let f = fixture();
        let start = f.now();
        f.runner.set_deadline(Duration::from_millis(10), start);
        f.runner.set_deadline(Duration::from_millis(10), start);
        f.run_pending();
        assert_eq!(f.run_times.lock().unwrap().len(), 1);
    }

    #[test]
    fn can_be_rearmed_after_firing() {
        let f = fixture();
        let start = f.now();
        f.runner.set_deadline(Duration::from_millis(10), start);
        f.run_pending();
        let second = f.now();
        f.runner.set_deadline(Duration::from_millis(100), second);
        f.run_pending();
        assert_eq!(
            *f.run_times.lock().unwrap(),
            vec![start + Duration::from_millis(10), second + Duration::from_millis(100)]
        );
    }

    #[test]
    fn cancel_prevents_firing() {
        let f = fixture();
        f.runner.set_deadline(Duration::from_millis(10), f.now());
        f.runner.cancel();
        f.run_pending();
        assert!(f.run_times.lock().unwrap().is_empty());
    }

    #[test]
    fn dropping_the_runner_drops_the_callback() {
        let f = fixture();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let queue = f.manager.new_queue("other");
        let runner = DeadlineTaskRunner::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            TaskRunner::new(f.manager.clone(), queue),
        );
        runner.set_deadline(Duration::from_millis(5), f.now());
        drop(runner);
        f.run_pending();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
