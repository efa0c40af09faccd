//! Use-case detection and policy derivation.
//!
//! Lock order is always `any_thread` first, then `main_thread_only`.

use std::sync::atomic::Ordering;
use std::time::Duration;

use cadence_core::TimeTicks;
use tracing::{debug, info, trace, warn};

use crate::queue::{QueueId, QueuePriority, TimeDomainType};

use super::state::{AnyThread, MainThreadOnly};
use super::types::{ExpensiveTaskPolicy, Policy, RailMode, TaskQueuePolicy, UseCase};
use super::RendererScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum UpdateType {
    MayEarlyOutIfPolicyUnchanged,
    ForceUpdate,
}

impl RendererScheduler {
    /// Recompute the policy and push it to the queues if it changed.
    pub fn update_policy(&self) {
        if self.is_shutdown() {
            return;
        }
        let mut any = self.any_thread();
        self.update_policy_locked(&mut any, UpdateType::MayEarlyOutIfPolicyUnchanged);
    }

    /// Recompute the policy and push it even if it looks unchanged.
    pub fn force_update_policy(&self) {
        if self.is_shutdown() {
            return;
        }
        let mut any = self.any_thread();
        self.update_policy_locked(&mut any, UpdateType::ForceUpdate);
    }

    /// Catch up on an update another thread asked for but which has not
    /// run yet.
    pub(super) fn maybe_update_policy(&self) {
        if self.policy_may_need_update.load(Ordering::Acquire) {
            self.update_policy();
        }
    }

    /// Ask the main thread to update policy as soon as possible. Safe to
    /// call from any thread; repeated calls collapse into one task.
    pub(super) fn ensure_urgent_policy_update_posted(&self) {
        if self.policy_may_need_update.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = self.weak_self.clone();
        self.control_task_runner().post_task(move || {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.update_policy();
            }
        });
    }

    pub(super) fn update_policy_locked(&self, any: &mut AnyThread, update_type: UpdateType) {
        if self.is_shutdown() {
            return;
        }
        self.policy_may_need_update.store(false, Ordering::Release);

        let now = self.now();
        let mut guard = self.main_thread_only();
        let main = &mut *guard;

        let navigation_pending = main.navigation_task_expected_count > 0;
        let (use_case, expected_use_case_duration) =
            compute_current_use_case(any, now, navigation_pending);
        let previous_use_case = main.current_use_case;
        main.current_use_case = use_case;

        let (touchstart_expected_soon, touchstart_expected_flag_valid_for) =
            if main.has_visible_render_widget_with_touch_handler {
                any.user_model.is_gesture_expected_soon(now)
            } else {
                (false, Duration::ZERO)
            };
        main.touchstart_expected_soon = touchstart_expected_soon;

        let longest_jank_free_task_duration = self.estimate_longest_jank_free_task_duration(main, use_case);
        main.longest_jank_free_task_duration = longest_jank_free_task_duration;
        main.loading_tasks_seem_expensive =
            main.loading_task_cost_estimator.expected_task_duration() > longest_jank_free_task_duration;
        main.timer_tasks_seem_expensive =
            main.timer_task_cost_estimator.expected_task_duration() > longest_jank_free_task_duration;

        // Re-check when either the use case or the touchstart prediction
        // stops holding, whichever comes first.
        let new_policy_duration = min_non_zero(expected_use_case_duration, touchstart_expected_flag_valid_for);
        if new_policy_duration.is_zero() {
            main.current_policy_expiration_time = None;
        } else {
            main.current_policy_expiration_time = Some(now + new_policy_duration);
            main.delayed_update_policy_runner.set_deadline(new_policy_duration, now);
        }

        let frame_interval = main.compositor_frame_interval;
        let expected_idle = main.idle_time_estimator.expected_idle_duration(frame_interval);
        let main_thread_compositing_is_fast = expected_idle.as_secs_f64()
            > frame_interval.as_secs_f64() * self.config.policy.fast_compositing_idle_time_threshold;
        let fast_or_normal = if main_thread_compositing_is_fast {
            QueuePriority::High
        } else {
            QueuePriority::Normal
        };

        let mut new_policy = Policy::default();
        let mut expensive_task_policy = ExpensiveTaskPolicy::Run;

        match use_case {
            UseCase::CompositorGesture => {
                if touchstart_expected_soon {
                    new_policy.rail_mode = RailMode::Response;
                    expensive_task_policy = ExpensiveTaskPolicy::Block;
                    new_policy.compositor_queue_policy.priority = QueuePriority::High;
                } else {
                    // Compositor work is not on the critical path here.
                    new_policy.compositor_queue_policy.priority = QueuePriority::BestEffort;
                }
            }
            UseCase::SynchronizedGesture => {
                new_policy.compositor_queue_policy.priority = fast_or_normal;
                if touchstart_expected_soon {
                    new_policy.rail_mode = RailMode::Response;
                    expensive_task_policy = ExpensiveTaskPolicy::Block;
                } else {
                    expensive_task_policy = ExpensiveTaskPolicy::Throttle;
                }
            }
            UseCase::MainThreadCustomInputHandling => {
                new_policy.compositor_queue_policy.priority = fast_or_normal;
            }
            UseCase::MainThreadGesture => {
                new_policy.compositor_queue_policy.priority = QueuePriority::High;
                if touchstart_expected_soon {
                    new_policy.rail_mode = RailMode::Response;
                    expensive_task_policy = ExpensiveTaskPolicy::Block;
                } else {
                    expensive_task_policy = ExpensiveTaskPolicy::Throttle;
                }
            }
            UseCase::Touchstart => {
                new_policy.rail_mode = RailMode::Response;
                new_policy.compositor_queue_policy.priority = QueuePriority::High;
                new_policy.loading_queue_policy.is_enabled = false;
                new_policy.timer_queue_policy.is_enabled = false;
                expensive_task_policy = ExpensiveTaskPolicy::Block;
            }
            UseCase::None => {
                // A touchstart is only an early signal for compositor
                // gestures; main thread gestures are handled above.
                if touchstart_expected_soon && any.last_gesture_was_compositor_driven {
                    new_policy.rail_mode = RailMode::Response;
                    expensive_task_policy = ExpensiveTaskPolicy::Block;
                }
            }
            UseCase::Loading => {
                new_policy.rail_mode = RailMode::Load;
                new_policy.loading_queue_policy.priority = QueuePriority::High;
                new_policy.default_queue_policy.priority = QueuePriority::High;
            }
        }

        if main.renderer_hidden {
            new_policy.rail_mode = RailMode::Idle;
        }

        if expensive_task_policy != ExpensiveTaskPolicy::Run
            && (!main.expensive_task_blocking_allowed
                || !main.have_seen_a_begin_main_frame
                || navigation_pending)
        {
            expensive_task_policy = ExpensiveTaskPolicy::Run;
        }
        if expensive_task_policy == ExpensiveTaskPolicy::Block
            && self.idle_periods_starving(any, now)
        {
            expensive_task_policy = ExpensiveTaskPolicy::Run;
        }

        match expensive_task_policy {
            ExpensiveTaskPolicy::Run => {}
            ExpensiveTaskPolicy::Block => {
                if main.loading_tasks_seem_expensive {
                    new_policy.loading_queue_policy.is_enabled = false;
                }
                if main.timer_tasks_seem_expensive {
                    new_policy.timer_queue_policy.is_enabled = false;
                }
            }
            ExpensiveTaskPolicy::Throttle => {
                if main.loading_tasks_seem_expensive {
                    new_policy.loading_queue_policy.time_domain = TimeDomainType::Throttled;
                }
                if main.timer_tasks_seem_expensive {
                    new_policy.timer_queue_policy.time_domain = TimeDomainType::Throttled;
                }
            }
        }
        main.expensive_task_policy = expensive_task_policy;

        let timers_suspended = main.timer_queue_suspend_count != 0 || main.timer_queue_suspended_when_backgrounded;
        if timers_suspended {
            new_policy.timer_queue_policy.is_enabled = false;
            new_policy.timer_queue_policy.time_domain = TimeDomainType::Real;
        }

        if main.renderer_suspended {
            new_policy.loading_queue_policy.is_enabled = false;
        }

        if main.use_virtual_time {
            for queue_policy in [
                &mut new_policy.compositor_queue_policy,
                &mut new_policy.default_queue_policy,
                &mut new_policy.loading_queue_policy,
                &mut new_policy.timer_queue_policy,
            ] {
                queue_policy.time_domain = TimeDomainType::Virtual;
            }
        }

        // Only report when blocking is what actually keeps timers off:
        // touchstart and suspension disable them regardless.
        let blocking_intervention = expensive_task_policy == ExpensiveTaskPolicy::Block
            && main.timer_tasks_seem_expensive
            && use_case != UseCase::Touchstart
            && !timers_suspended
            && !main.have_reported_blocking_intervention_since_navigation;
        if blocking_intervention {
            main.have_reported_blocking_intervention_since_navigation = true;
            warn!(
                use_case = %use_case,
                expected_timer_task_ms = main.timer_task_cost_estimator.expected_task_duration().as_millis() as u64,
                longest_jank_free_ms = longest_jank_free_task_duration.as_millis() as u64,
                "blocking expensive timer tasks to keep input responsive"
            );
        }

        let policy_changed = new_policy != main.current_policy;
        let apply = update_type == UpdateType::ForceUpdate || policy_changed;
        {
            let mut metrics = self.metrics.write().unwrap();
            metrics.record_policy_update(use_case, apply);
            metrics.gesture_predictions = any.user_model.stats();
            if blocking_intervention {
                metrics.blocking_interventions += 1;
            }
        }

        if use_case != previous_use_case {
            info!(
                from = %previous_use_case,
                to = %use_case,
                expires_in_ms = new_policy_duration.as_millis() as u64,
                "use case changed"
            );
        }

        if !apply {
            trace!(use_case = %use_case, "policy unchanged");
            return;
        }

        let previous_policy = main.current_policy;
        self.apply_task_queue_policy(
            self.compositor_queue,
            &previous_policy.compositor_queue_policy,
            &new_policy.compositor_queue_policy,
        );
        for &queue in &main.loading_queues {
            self.apply_task_queue_policy(
                queue,
                &previous_policy.loading_queue_policy,
                &new_policy.loading_queue_policy,
            );
        }
        for &queue in &main.timer_queues {
            self.apply_task_queue_policy(
                queue,
                &previous_policy.timer_queue_policy,
                &new_policy.timer_queue_policy,
            );
        }
        self.apply_task_queue_policy(
            self.default_queue,
            &previous_policy.default_queue_policy,
            &new_policy.default_queue_policy,
        );

        if new_policy.rail_mode != previous_policy.rail_mode {
            debug!(rail_mode = ?new_policy.rail_mode, "rail mode changed");
            if let Some(observer) = &main.rail_mode_observer {
                observer.on_rail_mode_changed(new_policy.rail_mode);
            }
        }

        debug!(
            use_case = %use_case,
            expensive_task_policy = ?expensive_task_policy,
            forced = update_type == UpdateType::ForceUpdate,
            "policy applied"
        );
        main.current_policy = new_policy;
    }

    /// Push the fields that differ between `old` and `new` to `queue`.
    pub(super) fn apply_task_queue_policy(&self, queue: QueueId, old: &TaskQueuePolicy, new: &TaskQueuePolicy) {
        if old.is_enabled != new.is_enabled {
            self.queue_manager.set_queue_enabled(queue, new.is_enabled);
        }
        if old.priority != new.priority {
            self.queue_manager.set_queue_priority(queue, new.priority);
        }
        if old.time_domain != new.time_domain {
            self.queue_manager.set_time_domain(queue, new.time_domain);
        }
    }

    fn estimate_longest_jank_free_task_duration(&self, main: &MainThreadOnly, use_case: UseCase) -> Duration {
        match use_case {
            UseCase::None | UseCase::CompositorGesture | UseCase::Loading | UseCase::Touchstart => {
                self.config.policy.rails_response_time()
            }
            UseCase::MainThreadCustomInputHandling
            | UseCase::MainThreadGesture
            | UseCase::SynchronizedGesture => main
                .idle_time_estimator
                .expected_idle_duration(main.compositor_frame_interval),
        }
    }

    /// No idle period has ended for longer than the starvation threshold.
    /// Before the first one ends, time is counted from construction.
    fn idle_periods_starving(&self, any: &AnyThread, now: TimeTicks) -> bool {
        if any.in_idle_period {
            return false;
        }
        let ended = any.last_idle_period_end_time.unwrap_or(self.created_at);
        now - ended >= self.config.idle.idle_period_starvation_threshold()
    }
}

/// Current use case and how long it is expected to last. A zero duration
/// means it holds until some signal changes it.
pub(super) fn compute_current_use_case(
    any: &AnyThread,
    now: TimeTicks,
    navigation_pending: bool,
) -> (UseCase, Duration) {
    let time_left_in_gesture = any.user_model.time_left_in_user_gesture(now);
    let gesture_active = !time_left_in_gesture.is_zero();

    if any.awaiting_touch_start_response && gesture_active {
        return (UseCase::Touchstart, time_left_in_gesture);
    }

    if gesture_active && any.last_gesture_was_compositor_driven {
        let use_case = if any.begin_main_frame_on_critical_path {
            UseCase::SynchronizedGesture
        } else {
            UseCase::CompositorGesture
        };
        return (use_case, time_left_in_gesture);
    }

    if let Some(deadline) = any.fling_compositor_escalation_deadline.filter(|d| *d > now) {
        return (UseCase::CompositorGesture, deadline - now);
    }

    if gesture_active {
        let use_case = if any.default_gesture_prevented {
            UseCase::MainThreadCustomInputHandling
        } else {
            UseCase::MainThreadGesture
        };
        return (use_case, time_left_in_gesture);
    }

    if let Some(deadline) = any.rails_loading_priority_deadline.filter(|d| *d > now) {
        return (UseCase::Loading, deadline - now);
    }
    if navigation_pending {
        return (UseCase::Loading, Duration::ZERO);
    }

    (UseCase::None, Duration::ZERO)
}

fn min_non_zero(a: Duration, b: Duration) -> Duration {
    match (a.is_zero(), b.is_zero()) {
        (true, _) => b,
        (_, true) => a,
        _ => a.min(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputEventType;

    fn at(ms: u64) -> TimeTicks {
        TimeTicks::from_millis(ms)
    }

    #[test]
    fn idle_signals_give_no_use_case() {
        let any = AnyThread::default();
        assert_eq!(compute_current_use_case(&any, at(1000), false), (UseCase::None, Duration::ZERO));
    }

    #[test]
    fn touchstart_beats_compositor_gesture() {
        let mut any = AnyThread::default();
        any.user_model.did_start_processing_input_event(InputEventType::TouchStart, at(1000));
        any.awaiting_touch_start_response = true;
        any.last_gesture_was_compositor_driven = true;
        any.fling_compositor_escalation_deadline = Some(at(1100));

        let (use_case, _) = compute_current_use_case(&any, at(1010), false);
        assert_eq!(use_case, UseCase::Touchstart);
    }

    #[test]
    fn compositor_gesture_becomes_synchronized_on_critical_path() {
        let mut any = AnyThread::default();
        any.user_model.did_start_processing_input_event(InputEventType::GestureScrollUpdate, at(1000));
        any.user_model.did_finish_processing_input_event(at(1000));
        any.last_gesture_was_compositor_driven = true;

        assert_eq!(
            compute_current_use_case(&any, at(1040), false),
            (UseCase::CompositorGesture, Duration::from_millis(60))
        );
        any.begin_main_frame_on_critical_path = true;
        assert_eq!(compute_current_use_case(&any, at(1040), false).0, UseCase::SynchronizedGesture);
    }

    #[test]
    fn fling_escalation_is_a_compositor_gesture() {
        let mut any = AnyThread::default();
        any.fling_compositor_escalation_deadline = Some(at(1100));
        assert_eq!(
            compute_current_use_case(&any, at(1030), false),
            (UseCase::CompositorGesture, Duration::from_millis(70))
        );
        assert_eq!(compute_current_use_case(&any, at(1100), false).0, UseCase::None);
    }

    #[test]
    fn prevented_default_means_custom_input_handling() {
        let mut any = AnyThread::default();
        any.user_model.did_start_processing_input_event(InputEventType::TouchMove, at(1000));
        any.default_gesture_prevented = true;
        assert_eq!(
            compute_current_use_case(&any, at(1000), false).0,
            UseCase::MainThreadCustomInputHandling
        );
        any.default_gesture_prevented = false;
        assert_eq!(compute_current_use_case(&any, at(1000), false).0, UseCase::MainThreadGesture);
    }

    #[test]
    fn loading_window_and_pending_navigation() {
        let mut any = AnyThread::default();
        any.rails_loading_priority_deadline = Some(at(2000));
        assert_eq!(
            compute_current_use_case(&any, at(1500), false),
            (UseCase::Loading, Duration::from_millis(500))
        );
        assert_eq!(compute_current_use_case(&any, at(2500), false).0, UseCase::None);
        assert_eq!(
            compute_current_use_case(&any, at(2500), true),
            (UseCase::Loading, Duration::ZERO)
        );
    }

    #[test]
    fn min_non_zero_ignores_zero() {
        let ms = Duration::from_millis;
        assert_eq!(min_non_zero(ms(0), ms(5)), ms(5));
        assert_eq!(min_non_zero(ms(7), ms(0)), ms(7));
        assert_eq!(min_non_zero(ms(7), ms(5)), ms(5));
        assert_eq!(min_non_zero(ms(0), ms(0)), ms(0));
    }
}
