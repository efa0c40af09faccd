use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cadence_scheduler::TaskQueuePolicy;

use crate::replay::{ReplayReport, Transition};

/// Final output of a replay run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub trace: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub report: ReplayReport,
}

impl RunSummary {
    pub fn new(trace: impl Into<String>, report: ReplayReport) -> Self {
        Self {
            trace: trace.into(),
            generated_at: Utc::now(),
            report,
        }
    }

    pub fn to_text(&self) -> String {
        let r = &self.report;
        let m = &r.metrics;
        let mut out = String::new();

        // Writing to a String never fails.
        let _ = writeln!(out, "trace:            {}", self.trace);
        let _ = writeln!(out, "events:           {}", r.events);
        let _ = writeln!(out, "tasks run:        {}", r.tasks_run);
        let _ = writeln!(out, "simulated time:   {}ms", r.duration_ms);
        let _ = writeln!(out, "final use case:   {}", r.final_use_case);
        let _ = writeln!(out, "rail mode:        {:?}", r.final_policy.rail_mode);
        let _ = writeln!(out, "  compositor      {}", describe_queue(&r.final_policy.compositor_queue_policy));
        let _ = writeln!(out, "  default         {}", describe_queue(&r.final_policy.default_queue_policy));
        let _ = writeln!(out, "  loading         {}", describe_queue(&r.final_policy.loading_queue_policy));
        let _ = writeln!(out, "  timer           {}", describe_queue(&r.final_policy.timer_queue_policy));
        let _ = writeln!(
            out,
            "policy updates:   {} ({} applied)",
            m.policy_updates, m.policies_applied
        );
        let _ = writeln!(
            out,
            "queueing time:    last {:.1}ms, max {:.1}ms over {} windows",
            m.last_expected_queueing_time.as_secs_f64() * 1000.0,
            m.max_expected_queueing_time.as_secs_f64() * 1000.0,
            m.queueing_time_windows
        );
        let _ = writeln!(out, "interventions:    {}", m.blocking_interventions);
        let _ = writeln!(
            out,
            "gestures:         {} predicted, {} unpredicted",
            m.gesture_predictions.correct, m.gesture_predictions.incorrect
        );
        let _ = writeln!(out, "transitions:      {}", r.transitions.len());
        out
    }
}

pub fn transition_line(t: &Transition) -> String {
    format!("{:>8}ms  {} -> {}", t.at_ms, t.from, t.to)
}

fn describe_queue(policy: &TaskQueuePolicy) -> String {
    format!(
        "{} {:?} {:?}",
        if policy.is_enabled { "enabled" } else { "disabled" },
        policy.priority,
        policy.time_domain
    )
}
