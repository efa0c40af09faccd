use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::renderer::UseCase;
use crate::user_model::GesturePredictionStats;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Policy computations, including those that changed nothing.
    pub policy_updates: u64,
    /// Policy computations that were pushed to the queues.
    pub policies_applied: u64,
    /// Times each use case was entered.
    pub use_case_transitions: HashMap<UseCase, u64>,
    pub current_use_case: UseCase,
    pub queueing_time_windows: u64,
    pub last_expected_queueing_time: Duration,
    pub max_expected_queueing_time: Duration,
    pub foreground_load_samples: u64,
    pub background_load_samples: u64,
    pub last_foreground_load: Option<f64>,
    pub last_background_load: Option<f64>,
    /// Navigations during which expensive timers were blocked.
    pub blocking_interventions: u64,
    pub gesture_predictions: GesturePredictionStats,
}

impl SchedulerMetrics {
    /// Record a policy pass and whether it reached the queues.
    pub fn record_policy_update(&mut self, use_case: UseCase, applied: bool) {
        self.policy_updates += 1;
        if applied {
            self.policies_applied += 1;
        }
        if use_case != self.current_use_case {
            *self.use_case_transitions.entry(use_case).or_default() += 1;
            self.current_use_case = use_case;
        }
    }

    pub fn record_queueing_time(&mut self, queueing_time: Duration) {
        self.queueing_time_windows += 1;
        self.last_expected_queueing_time = queueing_time;
        self.max_expected_queueing_time = self.max_expected_queueing_time.max(queueing_time);
    }

    pub fn record_load(&mut self, foreground: bool, load: f64) {
        if foreground {
            self.foreground_load_samples += 1;
            self.last_foreground_load = Some(load);
        } else {
            self.background_load_samples += 1;
            self.last_background_load = Some(load);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.current_use_case, UseCase::None);
        assert_eq!(m.policy_updates, 0);
        assert!(m.use_case_transitions.is_empty());
        assert_eq!(m.last_foreground_load, None);
    }

    #[test]
    fn transitions_counted_only_on_change() {
        let mut m = SchedulerMetrics::default();
        m.record_policy_update(UseCase::None, false);
        m.record_policy_update(UseCase::Touchstart, true);
        m.record_policy_update(UseCase::Touchstart, false);
        m.record_policy_update(UseCase::None, true);

        assert_eq!(m.policy_updates, 4);
        assert_eq!(m.policies_applied, 2);
        assert_eq!(m.use_case_transitions[&UseCase::Touchstart], 1);
        assert_eq!(m.use_case_transitions[&UseCase::None], 1);
        assert_eq!(m.current_use_case, UseCase::None);
    }

    #[test]
    fn queueing_time_tracks_maximum() {
        let mut m = SchedulerMetrics::default();
        m.record_queueing_time(Duration::from_millis(30));
        m.record_queueing_time(Duration::from_millis(10));
        assert_eq!(m.queueing_time_windows, 2);
        assert_eq!(m.last_expected_queueing_time, Duration::from_millis(10));
        assert_eq!(m.max_expected_queueing_time, Duration::from_millis(30));
    }

    #[test]
    fn load_split_by_visibility() {
        let mut m = SchedulerMetrics::default();
        m.record_load(true, 0.25);
        m.record_load(false, 0.5);
        m.record_load(false, 0.75);
        assert_eq!(m.foreground_load_samples, 1);
        assert_eq!(m.background_load_samples, 2);
        assert_eq!(m.last_background_load, Some(0.75));
    }

    #[test]
    fn serializes_to_json() {
        let mut m = SchedulerMetrics::default();
        m.record_policy_update(UseCase::Loading, true);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["current_use_case"], "loading");
        assert_eq!(json["use_case_transitions"]["loading"], 1);
    }
}
