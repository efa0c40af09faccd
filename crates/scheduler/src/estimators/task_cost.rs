use std::time::Duration;

use cadence_core::{RollingDurationHistory, TimeTicks};

/// Rolling estimate of how long the outermost tasks of one queue class take.
///
/// Nested run loops re-enter `will_process_task` before the outer task
/// finishes; only the outermost span is sampled.
#[derive(Debug, Clone)]
pub struct TaskCostEstimator {
    history: RollingDurationHistory,
    percentile: f64,
    outstanding_task_count: usize,
    task_start_time: Option<TimeTicks>,
}

impl TaskCostEstimator {
    pub fn new(sample_count: usize, percentile: f64) -> Self {
        Self {
            history: RollingDurationHistory::new(sample_count),
            percentile,
            outstanding_task_count: 0,
            task_start_time: None,
        }
    }

    pub fn will_process_task(&mut self, now: TimeTicks) {
        if self.outstanding_task_count == 0 {
            self.task_start_time = Some(now);
        }
        self.outstanding_task_count += 1;
    }

    pub fn did_process_task(&mut self, now: TimeTicks) {
        debug_assert!(self.outstanding_task_count > 0, "unbalanced did_process_task");
        self.outstanding_task_count = self.outstanding_task_count.saturating_sub(1);
        if self.outstanding_task_count == 0 {
            if let Some(start) = self.task_start_time.take() {
                self.history.insert_sample(now - start);
            }
        }
    }

    /// Configured percentile of recent task durations; zero with no samples.
    pub fn expected_task_duration(&self) -> Duration {
        self.history.percentile(self.percentile)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
