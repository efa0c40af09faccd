use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CadenceError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.parse().ok())
}

/// Upper bound for every millisecond setting: one day.
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

// ── Top-level config ──────────────────────────────────────────

/// Tunables for the renderer scheduler.
///
/// Parsed from `cadence.toml`; every key is optional and falls back to the
/// values the scheduler was calibrated with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub estimators: EstimatorConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

// ── Section configs ───────────────────────────────────────────

/// Sample windows for the task cost and idle time estimators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_cost_sample_count")]
    pub loading_task_estimator_sample_count: usize,
    #[serde(default = "default_cost_percentile")]
    pub loading_task_estimator_percentile: f64,
    #[serde(default = "default_cost_sample_count")]
    pub timer_task_estimator_sample_count: usize,
    #[serde(default = "default_cost_percentile")]
    pub timer_task_estimator_percentile: f64,
    #[serde(default = "default_short_idle_sample_count")]
    pub short_idle_period_sample_count: usize,
    #[serde(default = "default_short_idle_percentile")]
    pub short_idle_period_percentile: f64,
}

fn default_cost_sample_count() -> usize { 1000 }
fn default_cost_percentile() -> f64 { 99.0 }
fn default_short_idle_sample_count() -> usize { 10 }
fn default_short_idle_percentile() -> f64 { 50.0 }

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            loading_task_estimator_sample_count: default_cost_sample_count(),
            loading_task_estimator_percentile: default_cost_percentile(),
            timer_task_estimator_sample_count: default_cost_sample_count(),
            timer_task_estimator_percentile: default_cost_percentile(),
            short_idle_period_sample_count: default_short_idle_sample_count(),
            short_idle_period_percentile: default_short_idle_percentile(),
        }
    }
}

/// Timing constants of the use-case and policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Longest task that still lets the page respond within the RAIL budget.
    #[serde(default = "default_rails_response_time_ms")]
    pub rails_response_time_ms: u64,
    /// How long a compositor fling animation counts as an active gesture.
    #[serde(default = "default_fling_escalation_limit_ms")]
    pub fling_escalation_limit_ms: u64,
    /// Loading priority window after a navigation starts.
    #[serde(default = "default_rails_initial_loading_prioritization_ms")]
    pub rails_initial_loading_prioritization_ms: u64,
    #[serde(default = "default_suspend_timers_when_backgrounded_delay_ms")]
    pub suspend_timers_when_backgrounded_delay_ms: u64,
    #[serde(default)]
    pub timer_queue_suspension_when_backgrounded: bool,
    /// Fraction of the frame interval that must be left idle for
    /// main-thread compositing to count as fast.
    #[serde(default = "default_fast_compositing_idle_time_threshold")]
    pub fast_compositing_idle_time_threshold: f64,
}

fn default_rails_response_time_ms() -> u64 { 50 }
fn default_fling_escalation_limit_ms() -> u64 { 100 }
fn default_rails_initial_loading_prioritization_ms() -> u64 { 1000 }
fn default_suspend_timers_when_backgrounded_delay_ms() -> u64 { 5 * 60 * 1000 }
fn default_fast_compositing_idle_time_threshold() -> f64 { 0.2 }

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rails_response_time_ms: default_rails_response_time_ms(),
            fling_escalation_limit_ms: default_fling_escalation_limit_ms(),
            rails_initial_loading_prioritization_ms:
                default_rails_initial_loading_prioritization_ms(),
            suspend_timers_when_backgrounded_delay_ms:
                default_suspend_timers_when_backgrounded_delay_ms(),
            timer_queue_suspension_when_backgrounded: false,
            fast_compositing_idle_time_threshold: default_fast_compositing_idle_time_threshold(),
        }
    }
}

/// Idle period gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    #[serde(default = "default_end_idle_when_hidden_delay_ms")]
    pub end_idle_when_hidden_delay_ms: u64,
    #[serde(default = "default_idle_period_starvation_threshold_ms")]
    pub idle_period_starvation_threshold_ms: u64,
}

fn default_end_idle_when_hidden_delay_ms() -> u64 { 10_000 }
fn default_idle_period_starvation_threshold_ms() -> u64 { 10_000 }

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            end_idle_when_hidden_delay_ms: default_end_idle_when_hidden_delay_ms(),
            idle_period_starvation_threshold_ms: default_idle_period_starvation_threshold_ms(),
        }
    }
}

/// Queueing time and main thread load reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_queueing_time_window_ms")]
    pub queueing_time_window_ms: u64,
    #[serde(default = "default_load_reporting_interval_ms")]
    pub load_reporting_interval_ms: u64,
    /// Active time to accumulate before the first load sample is reported.
    #[serde(default = "default_load_waiting_period_ms")]
    pub load_waiting_period_ms: u64,
}

fn default_queueing_time_window_ms() -> u64 { 1000 }
fn default_load_reporting_interval_ms() -> u64 { 60_000 }
fn default_load_waiting_period_ms() -> u64 { 120_000 }

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            queueing_time_window_ms: default_queueing_time_window_ms(),
            load_reporting_interval_ms: default_load_reporting_interval_ms(),
            load_waiting_period_ms: default_load_waiting_period_ms(),
        }
    }
}

// ── Durations ─────────────────────────────────────────────────

impl PolicyConfig {
    pub fn rails_response_time(&self) -> Duration {
        Duration::from_millis(self.rails_response_time_ms)
    }

    pub fn fling_escalation_limit(&self) -> Duration {
        Duration::from_millis(self.fling_escalation_limit_ms)
    }

    pub fn rails_initial_loading_prioritization(&self) -> Duration {
        Duration::from_millis(self.rails_initial_loading_prioritization_ms)
    }

    pub fn suspend_timers_when_backgrounded_delay(&self) -> Duration {
        Duration::from_millis(self.suspend_timers_when_backgrounded_delay_ms)
    }
}

impl IdleConfig {
    pub fn end_idle_when_hidden_delay(&self) -> Duration {
        Duration::from_millis(self.end_idle_when_hidden_delay_ms)
    }

    pub fn idle_period_starvation_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_period_starvation_threshold_ms)
    }
}

impl DiagnosticsConfig {
    pub fn queueing_time_window(&self) -> Duration {
        Duration::from_millis(self.queueing_time_window_ms)
    }

    pub fn load_reporting_interval(&self) -> Duration {
        Duration::from_millis(self.load_reporting_interval_ms)
    }

    pub fn load_waiting_period(&self) -> Duration {
        Duration::from_millis(self.load_waiting_period_ms)
    }
}

// ── Loading & Validation ──────────────────────────────────────

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CadenceError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, CadenceError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CadenceError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `CADENCE_SECTION_KEY` overrides `section.key`, e.g.
    /// `CADENCE_POLICY_RAILS_RESPONSE_TIME_MS` → `policy.rails_response_time_ms`.
    fn apply_env_overrides(&mut self) {
        let e = &mut self.estimators;
        if let Some(v) = env_parse("CADENCE_ESTIMATORS_LOADING_TASK_ESTIMATOR_SAMPLE_COUNT") {
            e.loading_task_estimator_sample_count = v;
        }
        if let Some(v) = env_parse("CADENCE_ESTIMATORS_LOADING_TASK_ESTIMATOR_PERCENTILE") {
            e.loading_task_estimator_percentile = v;
        }
        if let Some(v) = env_parse("CADENCE_ESTIMATORS_TIMER_TASK_ESTIMATOR_SAMPLE_COUNT") {
            e.timer_task_estimator_sample_count = v;
        }
        if let Some(v) = env_parse("CADENCE_ESTIMATORS_TIMER_TASK_ESTIMATOR_PERCENTILE") {
            e.timer_task_estimator_percentile = v;
        }
        if let Some(v) = env_parse("CADENCE_ESTIMATORS_SHORT_IDLE_PERIOD_SAMPLE_COUNT") {
            e.short_idle_period_sample_count = v;
        }
        if let Some(v) = env_parse("CADENCE_ESTIMATORS_SHORT_IDLE_PERIOD_PERCENTILE") {
            e.short_idle_period_percentile = v;
        }

        let p = &mut self.policy;
        if let Some(v) = env_parse("CADENCE_POLICY_RAILS_RESPONSE_TIME_MS") {
            p.rails_response_time_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_POLICY_FLING_ESCALATION_LIMIT_MS") {
            p.fling_escalation_limit_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_POLICY_RAILS_INITIAL_LOADING_PRIORITIZATION_MS") {
            p.rails_initial_loading_prioritization_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_POLICY_SUSPEND_TIMERS_WHEN_BACKGROUNDED_DELAY_MS") {
            p.suspend_timers_when_backgrounded_delay_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_POLICY_TIMER_QUEUE_SUSPENSION_WHEN_BACKGROUNDED") {
            p.timer_queue_suspension_when_backgrounded = v;
        }
        if let Some(v) = env_parse("CADENCE_POLICY_FAST_COMPOSITING_IDLE_TIME_THRESHOLD") {
            p.fast_compositing_idle_time_threshold = v;
        }

        if let Some(v) = env_parse("CADENCE_IDLE_END_IDLE_WHEN_HIDDEN_DELAY_MS") {
            self.idle.end_idle_when_hidden_delay_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_IDLE_IDLE_PERIOD_STARVATION_THRESHOLD_MS") {
            self.idle.idle_period_starvation_threshold_ms = v;
        }

        let d = &mut self.diagnostics;
        if let Some(v) = env_parse("CADENCE_DIAGNOSTICS_QUEUEING_TIME_WINDOW_MS") {
            d.queueing_time_window_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_DIAGNOSTICS_LOAD_REPORTING_INTERVAL_MS") {
            d.load_reporting_interval_ms = v;
        }
        if let Some(v) = env_parse("CADENCE_DIAGNOSTICS_LOAD_WAITING_PERIOD_MS") {
            d.load_waiting_period_ms = v;
        }
    }

    /// Reject values the estimators cannot work with.
    pub fn validate(&self) -> Result<(), CadenceError> {
        let e = &self.estimators;
        for (name, count) in [
            ("loading_task_estimator_sample_count", e.loading_task_estimator_sample_count),
            ("timer_task_estimator_sample_count", e.timer_task_estimator_sample_count),
            ("short_idle_period_sample_count", e.short_idle_period_sample_count),
        ] {
            if count == 0 {
                return Err(CadenceError::Config(format!(
                    "estimators.{name} must be greater than zero"
                )));
            }
        }
        for (name, percentile) in [
            ("loading_task_estimator_percentile", e.loading_task_estimator_percentile),
            ("timer_task_estimator_percentile", e.timer_task_estimator_percentile),
            ("short_idle_period_percentile", e.short_idle_period_percentile),
        ] {
            if !(0.0..=100.0).contains(&percentile) {
                return Err(CadenceError::Config(format!(
                    "estimators.{name} must be within 0..=100, got {percentile}"
                )));
            }
        }

        let threshold = self.policy.fast_compositing_idle_time_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CadenceError::Config(format!(
                "policy.fast_compositing_idle_time_threshold must be within (0, 1], got {threshold}"
            )));
        }

        let p = &self.policy;
        let i = &self.idle;
        let d = &self.diagnostics;
        for (name, value) in [
            ("policy.rails_response_time_ms", p.rails_response_time_ms),
            ("policy.fling_escalation_limit_ms", p.fling_escalation_limit_ms),
            (
                "policy.rails_initial_loading_prioritization_ms",
                p.rails_initial_loading_prioritization_ms,
            ),
            (
                "policy.suspend_timers_when_backgrounded_delay_ms",
                p.suspend_timers_when_backgrounded_delay_ms,
            ),
            ("idle.end_idle_when_hidden_delay_ms", i.end_idle_when_hidden_delay_ms),
            ("idle.idle_period_starvation_threshold_ms", i.idle_period_starvation_threshold_ms),
            ("diagnostics.queueing_time_window_ms", d.queueing_time_window_ms),
            ("diagnostics.load_reporting_interval_ms", d.load_reporting_interval_ms),
            ("diagnostics.load_waiting_period_ms", d.load_waiting_period_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(CadenceError::Config(format!(
                    "{name} must be at most {MAX_DURATION_MS}, got {value}"
                )));
            }
        }

        if d.queueing_time_window_ms == 0 {
            return Err(CadenceError::Config(
                "diagnostics.queueing_time_window_ms must be greater than zero".into(),
            ));
        }
        if d.load_reporting_interval_ms == 0 {
            return Err(CadenceError::Config(
                "diagnostics.load_reporting_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        info!("Scheduler configuration:");
        info!(
            "  Estimators: loading {} samples @ p{}, timer {} samples @ p{}, idle {} samples @ p{}",
            self.estimators.loading_task_estimator_sample_count,
            self.estimators.loading_task_estimator_percentile,
            self.estimators.timer_task_estimator_sample_count,
            self.estimators.timer_task_estimator_percentile,
            self.estimators.short_idle_period_sample_count,
            self.estimators.short_idle_period_percentile,
        );
        info!(
            "  Policy: response {}ms, fling {}ms, loading window {}ms, background suspend {} after {}ms",
            self.policy.rails_response_time_ms,
            self.policy.fling_escalation_limit_ms,
            self.policy.rails_initial_loading_prioritization_ms,
            if self.policy.timer_queue_suspension_when_backgrounded { "on" } else { "off" },
            self.policy.suspend_timers_when_backgrounded_delay_ms,
        );
        info!(
            "  Idle: end when hidden after {}ms, starvation threshold {}ms",
            self.idle.end_idle_when_hidden_delay_ms,
            self.idle.idle_period_starvation_threshold_ms,
        );
        info!(
            "  Diagnostics: queueing window {}ms, load interval {}ms (waiting {}ms)",
            self.diagnostics.queueing_time_window_ms,
            self.diagnostics.load_reporting_interval_ms,
            self.diagnostics.load_waiting_period_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg = SchedulerConfig::from_toml("").unwrap();
        assert_eq!(cfg.estimators.loading_task_estimator_sample_count, 1000);
        assert_eq!(cfg.estimators.short_idle_period_percentile, 50.0);
        assert_eq!(cfg.policy.rails_response_time(), Duration::from_millis(50));
        assert_eq!(cfg.idle.end_idle_when_hidden_delay(), Duration::from_secs(10));
        assert_eq!(cfg.diagnostics.queueing_time_window(), Duration::from_secs(1));
        assert!(!cfg.policy.timer_queue_suspension_when_backgrounded);
    }

    #[test]
    fn parse_partial_sections() {
        let toml = r#"
[policy]
rails_response_time_ms = 30
timer_queue_suspension_when_backgrounded = true

[diagnostics]
load_reporting_interval_ms = 1000
load_waiting_period_ms = 1000
"#;
        let cfg = SchedulerConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.policy.rails_response_time_ms, 30);
        assert!(cfg.policy.timer_queue_suspension_when_backgrounded);
        assert_eq!(cfg.policy.fling_escalation_limit_ms, 100); // default
        assert_eq!(cfg.diagnostics.load_reporting_interval(), Duration::from_secs(1));
        assert_eq!(cfg.estimators.timer_task_estimator_percentile, 99.0);
    }

    #[test]
    fn reject_out_of_range_percentile() {
        let toml = r#"
[estimators]
loading_task_estimator_percentile = 120.0
"#;
        let err = SchedulerConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("loading_task_estimator_percentile"));
    }

    #[test]
    fn reject_zero_sample_count() {
        let toml = r#"
[estimators]
short_idle_period_sample_count = 0
"#;
        assert!(matches!(
            SchedulerConfig::from_toml(toml),
            Err(CadenceError::Config(_))
        ));
    }

    #[test]
    fn reject_zero_queueing_window() {
        let mut cfg = SchedulerConfig::default();
        cfg.diagnostics.queueing_time_window_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reject_bad_compositing_threshold() {
        let mut cfg = SchedulerConfig::default();
        cfg.policy.fast_compositing_idle_time_threshold = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reject_durations_beyond_a_day() {
        let toml = r#"
[idle]
idle_period_starvation_threshold_ms = 9223372036854775807
"#;
        let err = SchedulerConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("idle.idle_period_starvation_threshold_ms"));

        let mut cfg = SchedulerConfig::default();
        cfg.policy.suspend_timers_when_backgrounded_delay_ms = MAX_DURATION_MS;
        cfg.validate().unwrap();
        cfg.policy.suspend_timers_when_backgrounded_delay_ms = MAX_DURATION_MS + 1;
        assert!(matches!(cfg.validate(), Err(CadenceError::Config(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            SchedulerConfig::from_toml("[policy\nrails = 1"),
            Err(CadenceError::ConfigParse(_))
        ));
    }

    #[test]
    fn default_config_is_valid() {
        SchedulerConfig::default().validate().unwrap();
    }
}
