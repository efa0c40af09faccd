use std::time::Duration;

use cadence_core::TimeTicks;
use tracing::trace;

use crate::idle::{IdleHelperDelegate, LongIdleDecision};

use super::types::UseCase;
use super::RendererScheduler;

impl IdleHelperDelegate for RendererScheduler {
    fn can_enter_long_idle_period(&self, now: TimeTicks) -> LongIdleDecision {
        if self.is_shutdown() {
            return LongIdleDecision::Allowed;
        }
        self.maybe_update_policy();

        let main = self.main_thread_only();
        if main.current_use_case == UseCase::Touchstart {
            // Try again once the touchstart policy is due to expire.
            let retry = main
                .current_policy_expiration_time
                .map_or(Duration::ZERO, |expires| expires.saturating_duration_since(now));
            trace!(retry_ms = retry.as_millis() as u64, "long idle refused during touchstart");
            return LongIdleDecision::RetryAfter(retry);
        }

        let end_idle_when_hidden_delay = self.config.idle.end_idle_when_hidden_delay();
        if main
            .hidden_since
            .is_some_and(|since| now - since >= end_idle_when_hidden_delay)
        {
            trace!("long idle refused for long-hidden renderer");
            return LongIdleDecision::RetryAfter(end_idle_when_hidden_delay);
        }

        LongIdleDecision::Allowed
    }

    fn on_idle_period_started(&self) {
        self.any_thread().in_idle_period = true;
    }

    fn on_idle_period_ended(&self) {
        let now = self.now();
        let mut any = self.any_thread();
        any.in_idle_period = false;
        any.last_idle_period_end_time = Some(now);
    }
}
