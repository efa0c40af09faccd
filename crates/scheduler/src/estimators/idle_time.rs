use std::time::Duration;

use cadence_core::{RollingDurationHistory, TimeTicks};
use tracing::trace;

/// Estimates how much of a frame interval is left after compositor work.
///
/// Compositor-queue task time is summed per frame; a commit to the
/// compositor closes the frame and turns the sum into a sample.
#[derive(Debug, Clone)]
pub struct IdleTimeEstimator {
    per_frame_compositor_task_runtime: RollingDurationHistory,
    percentile: f64,
    nesting_level: usize,
    task_start_time: Option<TimeTicks>,
    cumulative_compositor_runtime: Duration,
    did_commit: bool,
}

impl IdleTimeEstimator {
    pub fn new(sample_count: usize, percentile: f64) -> Self {
        Self {
            per_frame_compositor_task_runtime: RollingDurationHistory::new(sample_count),
            percentile,
            nesting_level: 0,
            task_start_time: None,
            cumulative_compositor_runtime: Duration::ZERO,
            did_commit: false,
        }
    }

    /// Expected idle time left in a frame of length `frame_interval`.
    pub fn expected_idle_duration(&self, frame_interval: Duration) -> Duration {
        if self.per_frame_compositor_task_runtime.is_empty() {
            return frame_interval;
        }
        let expected_runtime = self.per_frame_compositor_task_runtime.percentile(self.percentile);
        frame_interval.saturating_sub(expected_runtime)
    }

    /// Called once the frame's main thread work has been handed over.
    pub fn did_commit_frame_to_compositor(&mut self) {
        if self.nesting_level == 1 {
            self.did_commit = true;
        } else if self.nesting_level == 0 {
            // Commit outside any compositor task: the frame is already done.
            self.close_frame();
        }
    }

    pub fn will_process_task(&mut self, now: TimeTicks) {
        self.nesting_level += 1;
        if self.nesting_level == 1 {
            self.task_start_time = Some(now);
        }
    }

    pub fn did_process_task(&mut self, now: TimeTicks) {
        debug_assert!(self.nesting_level > 0, "unbalanced did_process_task");
        self.nesting_level = self.nesting_level.saturating_sub(1);
        if self.nesting_level != 0 {
            return;
        }
        if let Some(start) = self.task_start_time.take() {
            self.cumulative_compositor_runtime += now - start;
        }
        if self.did_commit {
            self.close_frame();
        }
    }

    pub fn clear(&mut self) {
        self.per_frame_compositor_task_runtime.clear();
        self.task_start_time = None;
        self.cumulative_compositor_runtime = Duration::ZERO;
        self.did_commit = false;
    }

    fn close_frame(&mut self) {
        trace!(
            runtime_us = self.cumulative_compositor_runtime.as_micros() as u64,
            "compositor frame sample"
        );
        self.per_frame_compositor_task_runtime
            .insert_sample(self.cumulative_compositor_runtime);
        self.cumulative_compositor_runtime = Duration::ZERO;
        self.did_commit = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    fn ms(v: u64) -> TimeTicks {
        TimeTicks::from_millis(v)
    }

    fn simulate_frame(e: &mut IdleTimeEstimator, start: u64, task_lengths: &[u64]) {
        let mut now = start;
        let last = task_lengths.len() - 1;
        for (i, len) in task_lengths.iter().enumerate() {
            e.will_process_task(ms(now));
            now += len;
            if i == last {
                e.did_commit_frame_to_compositor();
            }
            e.did_process_task(ms(now));
        }
    }

    #[test]
    fn no_samples_returns_full_frame() {
        let e = IdleTimeEstimator::new(10, 50.0);
        assert_eq!(e.expected_idle_duration(FRAME), FRAME);
    }

    #[test]
    fn single_task_per_frame() {
        let mut e = IdleTimeEstimator::new(10, 50.0);
        for frame in 0..3 {
            simulate_frame(&mut e, frame * 16, &[5]);
        }
        assert_eq!(e.expected_idle_duration(FRAME), Duration::from_millis(11));
    }

    #[test]
    fn multiple_tasks_sum_per_frame() {
        let mut e = IdleTimeEstimator::new(10, 50.0);
        simulate_frame(&mut e, 0, &[2, 3, 4]);
        assert_eq!(e.expected_idle_duration(FRAME), Duration::from_millis(7));
    }

    #[test]
    fn median_of_frames() {
        let mut e = IdleTimeEstimator::new(10, 50.0);
        simulate_frame(&mut e, 0, &[2]);
        simulate_frame(&mut e, 16, &[10]);
        simulate_frame(&mut e, 32, &[6]);
        assert_eq!(e.expected_idle_duration(FRAME), Duration::from_millis(10));
    }

    #[test]
    fn nested_tasks_are_ignored() {
        let mut e = IdleTimeEstimator::new(10, 50.0);
        e.will_process_task(ms(0));
        e.will_process_task(ms(1));
        e.did_commit_frame_to_compositor();
        e.did_process_task(ms(3));
        e.did_process_task(ms(8));
        // Commit inside a nested task does not close the frame.
        assert_eq!(e.expected_idle_duration(FRAME), FRAME);

        e.will_process_task(ms(10));
        e.did_commit_frame_to_compositor();
        e.did_process_task(ms(12));
        assert_eq!(e.expected_idle_duration(FRAME), Duration::from_millis(6));
    }

    #[test]
    fn runtime_larger_than_frame_saturates() {
        let mut e = IdleTimeEstimator::new(10, 50.0);
        simulate_frame(&mut e, 0, &[40]);
        assert_eq!(e.expected_idle_duration(FRAME), Duration::ZERO);
    }

    #[test]
    fn clear_forgets_frames() {
        let mut e = IdleTimeEstimator::new(10, 50.0);
        simulate_frame(&mut e, 0, &[5]);
        e.clear();
        assert_eq!(e.expected_idle_duration(FRAME), FRAME);
    }
}
