use std::time::Duration;

use cadence_core::TimeTicks;

/// Receives the expected queueing time of each completed window.
pub trait QueueingTimeEstimatorClient {
    fn on_queueing_time_for_window_estimated(&mut self, queueing_time: Duration);
}

/// Estimates how long a task posted at a uniformly random instant of each
/// window would have waited for the running task to finish.
///
/// Windows are back to back, start at the first observed task and are
/// reported exactly once, when a task ending past the window is recorded.
#[derive(Debug, Clone)]
pub struct QueueingTimeEstimator {
    window_duration: Duration,
    window_start_time: Option<TimeTicks>,
    current_expected_queueing_time: Duration,
}

impl QueueingTimeEstimator {
    pub fn new(window_duration: Duration) -> Self {
        debug_assert!(!window_duration.is_zero(), "window must be positive");
        Self {
            window_duration,
            window_start_time: None,
            current_expected_queueing_time: Duration::ZERO,
        }
    }

    pub fn on_toplevel_task_completed(
        &mut self,
        client: &mut dyn QueueingTimeEstimatorClient,
        task_start: TimeTicks,
        task_end: TimeTicks,
    ) {
        debug_assert!(task_start <= task_end, "task ends before it starts");
        let mut window_start = *self.window_start_time.get_or_insert(task_start);

        while task_end > window_start + self.window_duration {
            let window_end = window_start + self.window_duration;
            if task_start <= window_end {
                self.current_expected_queueing_time +=
                    expected_queueing_time_from_task(task_start, task_end, window_start, window_end);
            }
            client.on_queueing_time_for_window_estimated(self.current_expected_queueing_time);
            window_start = window_end;
            self.current_expected_queueing_time = Duration::ZERO;
        }
        self.window_start_time = Some(window_start);

        self.current_expected_queueing_time += expected_queueing_time_from_task(
            task_start,
            task_end,
            window_start,
            window_start + self.window_duration,
        );
    }

    /// Accumulated estimate for the window still open.
    pub fn current_expected_queueing_time(&self) -> Duration {
        self.current_expected_queueing_time
    }
}

/// Probability that a uniform probe lands on the task inside the window,
/// times the mean wait of such a probe: the average of the waits at the
/// two ends of the overlap.
fn expected_queueing_time_from_task(
    task_start: TimeTicks,
    task_end: TimeTicks,
    window_start: TimeTicks,
    window_end: TimeTicks,
) -> Duration {
    debug_assert!(task_start <= window_end);
    debug_assert!(window_start < window_end);
    debug_assert!(task_end >= window_start);

    let overlap_start = task_start.max(window_start);
    let overlap_end = task_end.min(window_end);
    let overlap = (overlap_end - overlap_start).as_nanos();
    let window = (window_end - window_start).as_nanos();
    if overlap == 0 || window == 0 {
        return Duration::ZERO;
    }

    let waits = (task_end - overlap_start).as_nanos() + (task_end - overlap_end).as_nanos();
    let nanos = overlap * waits / (2 * window);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingClient {
        estimates: Vec<Duration>,
    }

    impl QueueingTimeEstimatorClient for RecordingClient {
        fn on_queueing_time_for_window_estimated(&mut self, queueing_time: Duration) {
            self.estimates.push(queueing_time);
        }
    }

    fn ms(v: u64) -> TimeTicks {
        TimeTicks::from_millis(v)
    }

    #[test]
    fn all_tasks_within_window() {
        let mut client = RecordingClient::default();
        let mut estimator = QueueingTimeEstimator::new(Duration::from_secs(5));
        estimator.on_toplevel_task_completed(&mut client, ms(0), ms(1000));
        estimator.on_toplevel_task_completed(&mut client, ms(1500), ms(2500));
        estimator.on_toplevel_task_completed(&mut client, ms(3000), ms(4000));
        // Flushes the first window without contributing to it.
        estimator.on_toplevel_task_completed(&mut client, ms(9500), ms(10000));

        assert_eq!(client.estimates, vec![Duration::from_millis(300)]);
    }

    #[test]
    fn task_spanning_windows_splits_its_contribution() {
        let mut client = RecordingClient::default();
        let mut estimator = QueueingTimeEstimator::new(Duration::from_secs(5));
        estimator.on_toplevel_task_completed(&mut client, ms(0), ms(1000));
        // Runs 4s..7s: 1s in the first window, 2s in the second.
        estimator.on_toplevel_task_completed(&mut client, ms(4000), ms(7000));
        estimator.on_toplevel_task_completed(&mut client, ms(10000), ms(10500));

        // Window 1: 1/5 * 0.5s + 1/5 * avg(3s, 2s) = 100ms + 500ms.
        // Window 2: 2/5 * avg(2s, 0s) = 400ms.
        assert_eq!(
            client.estimates,
            vec![Duration::from_millis(600), Duration::from_millis(400)]
        );
    }

    #[test]
    fn long_task_reports_every_window_it_covers() {
        let mut client = RecordingClient::default();
        let mut estimator = QueueingTimeEstimator::new(Duration::from_secs(1));
        estimator.on_toplevel_task_completed(&mut client, ms(0), ms(3500));

        assert_eq!(
            client.estimates,
            vec![
                Duration::from_millis(3000),
                Duration::from_millis(2000),
                Duration::from_millis(1000),
            ]
        );
        assert_eq!(estimator.current_expected_queueing_time(), Duration::from_millis(125));
    }

    #[test]
    fn empty_windows_report_zero() {
        let mut client = RecordingClient::default();
        let mut estimator = QueueingTimeEstimator::new(Duration::from_secs(1));
        estimator.on_toplevel_task_completed(&mut client, ms(0), ms(0));
        estimator.on_toplevel_task_completed(&mut client, ms(2500), ms(2600));

        assert_eq!(client.estimates, vec![Duration::ZERO, Duration::ZERO]);
    }
}
