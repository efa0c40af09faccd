use std::fmt;
use std::time::Duration;

use cadence_core::TimeTicks;

/// Receives one load sample per reporting interval.
pub trait LoadReporter: Send + Sync {
    fn on_load_reported(&mut self, time: TimeTicks, load: f64);
}

impl<F> LoadReporter for F
where
    F: FnMut(TimeTicks, f64) + Send + Sync,
{
    fn on_load_reported(&mut self, time: TimeTicks, load: f64) {
        self(time, load)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadState {
    Active,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Idle,
    TaskRunning,
}

/// Turns task intervals into a busy fraction sampled every
/// `reporting_interval`.
///
/// Time spent paused counts as neither busy nor idle, and the first
/// `waiting_period` of active time is never reported.
pub struct ThreadLoadTracker {
    time: TimeTicks,
    next_reporting_time: TimeTicks,
    thread_state: ThreadState,
    last_state_change_time: TimeTicks,
    total_active_time: Duration,
    run_time_inside_window: Duration,
    waiting_period: Duration,
    reporting_interval: Duration,
    reporter: Box<dyn LoadReporter>,
}

impl fmt::Debug for ThreadLoadTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLoadTracker")
            .field("time", &self.time)
            .field("next_reporting_time", &self.next_reporting_time)
            .field("thread_state", &self.thread_state)
            .field("total_active_time", &self.total_active_time)
            .field("run_time_inside_window", &self.run_time_inside_window)
            .finish_non_exhaustive()
    }
}

impl ThreadLoadTracker {
    pub fn new(
        now: TimeTicks,
        reporter: impl LoadReporter + 'static,
        reporting_interval: Duration,
        waiting_period: Duration,
    ) -> Self {
        debug_assert!(!reporting_interval.is_zero(), "reporting interval must be positive");
        Self {
            time: now,
            next_reporting_time: now + reporting_interval,
            thread_state: ThreadState::Active,
            last_state_change_time: now,
            total_active_time: Duration::ZERO,
            run_time_inside_window: Duration::ZERO,
            waiting_period,
            reporting_interval,
            reporter: Box::new(reporter),
        }
    }

    pub fn pause(&mut self, now: TimeTicks) {
        self.advance(now, TaskState::Idle);
        self.thread_state = ThreadState::Paused;
        self.last_state_change_time = now;
    }

    pub fn resume(&mut self, now: TimeTicks) {
        self.advance(now, TaskState::Idle);
        self.thread_state = ThreadState::Active;
        self.last_state_change_time = now;
    }

    pub fn is_paused(&self) -> bool {
        self.thread_state == ThreadState::Paused
    }

    /// Attribute `[start, end)` as busy time. Ignored while paused.
    pub fn record_task_time(&mut self, start: TimeTicks, end: TimeTicks) {
        debug_assert!(start <= end, "task ends before it starts");
        let start = start.max(self.last_state_change_time);
        let end = end.max(self.last_state_change_time);
        self.advance(start, TaskState::Idle);
        self.advance(end, TaskState::TaskRunning);
    }

    pub fn record_idle(&mut self, now: TimeTicks) {
        self.advance(now, TaskState::Idle);
    }

    fn advance(&mut self, now: TimeTicks, task_state: TaskState) {
        if self.time > now {
            return;
        }

        if self.thread_state == ThreadState::Paused {
            self.time = now;
            self.next_reporting_time = now + self.reporting_interval;
            return;
        }

        while self.time < now {
            let next_time = self.next_reporting_time.min(now);
            let delta = next_time - self.time;

            self.total_active_time += delta;
            if task_state == TaskState::TaskRunning {
                self.run_time_inside_window += delta;
            }
            self.time = next_time;

            if self.time == self.next_reporting_time {
                if self.total_active_time >= self.waiting_period {
                    let load = self.load();
                    self.reporter.on_load_reported(self.time, load);
                }
                self.next_reporting_time += self.reporting_interval;
                self.run_time_inside_window = Duration::ZERO;
            }
        }
    }

    fn load(&self) -> f64 {
        self.run_time_inside_window.as_secs_f64() / self.reporting_interval.as_secs_f64()
    }
}
