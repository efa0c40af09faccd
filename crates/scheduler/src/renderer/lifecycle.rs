//! Frame, visibility, backgrounding and navigation signals.
//!
//! The idle helper calls back into the scheduler, so no scheduler borrow or
//! lock may be held across a call into it.

use tracing::{debug, info};

use super::policy::UpdateType;
use super::types::{BeginFrameArgs, NavigatingFrameType};
use super::RendererScheduler;

impl RendererScheduler {
    // ── Frames ──────────────────────────────────────────────────

    pub fn will_begin_frame(&self, args: BeginFrameArgs) {
        if self.is_shutdown() {
            return;
        }
        self.idle_helper.end_idle_period();
        {
            let mut main = self.main_thread_only();
            main.estimated_next_frame_begin = Some(args.frame_time + args.interval);
            main.have_seen_a_begin_main_frame = true;
            main.begin_frame_not_expected_soon = false;
            main.compositor_frame_interval = args.interval;
        }
        self.any_thread().begin_main_frame_on_critical_path = args.on_critical_path;
    }

    pub fn did_commit_frame_to_compositor(&self) {
        if self.is_shutdown() {
            return;
        }
        let now = self.now();
        let next_frame_begin = {
            let mut main = self.main_thread_only();
            main.idle_time_estimator.did_commit_frame_to_compositor();
            main.estimated_next_frame_begin
        };
        if let Some(deadline) = next_frame_begin.filter(|begin| now < *begin) {
            self.idle_helper.start_idle_period(now, deadline);
        }
    }

    pub fn begin_frame_not_expected_soon(&self) {
        if self.is_shutdown() {
            return;
        }
        self.main_thread_only().begin_frame_not_expected_soon = true;
        self.idle_helper.enable_long_idle_period(self.now());
        self.any_thread().begin_main_frame_on_critical_path = false;
    }

    // ── Visibility ──────────────────────────────────────────────

    pub fn set_all_render_widgets_hidden(&self, hidden: bool) {
        if self.is_shutdown() {
            return;
        }
        let now = self.now();
        let generation = {
            let mut main = self.main_thread_only();
            if main.renderer_hidden == hidden {
                return;
            }
            main.hidden_idle_generation += 1;
            main.renderer_hidden = hidden;
            main.hidden_since = hidden.then_some(now);
            main.hidden_idle_generation
        };
        info!(hidden, "render widget visibility changed");

        if hidden {
            self.idle_helper.enable_long_idle_period(now);
            let weak = self.weak_self.clone();
            self.control_task_runner().post_delayed_task(
                move || {
                    if let Some(scheduler) = weak.upgrade() {
                        scheduler.end_hidden_idle_period(generation);
                    }
                },
                self.config.idle.end_idle_when_hidden_delay(),
            );
        } else {
            self.idle_helper.end_idle_period();
        }
        self.update_policy();
    }

    /// Stop granting idle time to a renderer that has stayed hidden.
    fn end_hidden_idle_period(&self, generation: u64) {
        if self.is_shutdown() || self.main_thread_only().hidden_idle_generation != generation {
            return;
        }
        debug!("ending idle period of hidden renderer");
        self.idle_helper.end_idle_period();
    }

    pub fn set_has_visible_render_widget_with_touch_handler(&self, has_handler: bool) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if main.has_visible_render_widget_with_touch_handler == has_handler {
                return;
            }
            main.has_visible_render_widget_with_touch_handler = has_handler;
        }
        let mut any = self.any_thread();
        self.update_policy_locked(&mut any, UpdateType::ForceUpdate);
    }

    // ── Backgrounding and suspension ────────────────────────────

    pub fn on_renderer_backgrounded(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if main.renderer_backgrounded {
                return;
            }
            main.renderer_backgrounded = true;
        }
        info!("renderer backgrounded");
        self.update_policy();

        let now = self.now();
        let generation = {
            let mut main = self.main_thread_only();
            main.foreground_main_thread_load_tracker.pause(now);
            main.background_main_thread_load_tracker.resume(now);
            if !main.timer_queue_suspension_when_backgrounded_enabled {
                return;
            }
            main.suspend_timers_generation += 1;
            main.suspend_timers_generation
        };

        let weak = self.weak_self.clone();
        self.control_task_runner().post_delayed_task(
            move || {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.suspend_timer_queue_when_backgrounded(generation);
                }
            },
            self.config.policy.suspend_timers_when_backgrounded_delay(),
        );
    }

    pub fn on_renderer_foregrounded(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if !main.renderer_backgrounded {
                return;
            }
            main.renderer_backgrounded = false;
            main.renderer_suspended = false;
            main.suspend_timers_generation += 1;
        }
        info!("renderer foregrounded");
        self.update_policy();

        let now = self.now();
        {
            let mut main = self.main_thread_only();
            main.foreground_main_thread_load_tracker.resume(now);
            main.background_main_thread_load_tracker.pause(now);
        }
        self.resume_timer_queue_when_foregrounded();
    }

    fn suspend_timer_queue_when_backgrounded(&self, generation: u64) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if main.suspend_timers_generation != generation
                || !main.renderer_backgrounded
                || main.timer_queue_suspended_when_backgrounded
            {
                return;
            }
            main.timer_queue_suspended_when_backgrounded = true;
        }
        info!("suspending timers of backgrounded renderer");
        self.force_update_policy();
    }

    fn resume_timer_queue_when_foregrounded(&self) {
        {
            let mut main = self.main_thread_only();
            if !main.timer_queue_suspended_when_backgrounded {
                return;
            }
            main.timer_queue_suspended_when_backgrounded = false;
        }
        self.force_update_policy();
    }

    /// Stop timers and loading of a backgrounded renderer.
    pub fn suspend_renderer(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if !main.renderer_backgrounded {
                return;
            }
            main.suspend_timers_generation += 1;
            main.renderer_suspended = true;
            main.timer_queue_suspended_when_backgrounded = true;
        }
        info!("renderer suspended");
        self.force_update_policy();
    }

    pub fn resume_renderer(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if !main.renderer_backgrounded {
                return;
            }
            main.suspend_timers_generation += 1;
            main.renderer_suspended = false;
            main.timer_queue_suspended_when_backgrounded = false;
        }
        info!("renderer resumed");
        self.force_update_policy();
    }

    pub fn set_timer_queue_suspension_when_backgrounded_enabled(&self, enabled: bool) {
        self.main_thread_only().timer_queue_suspension_when_backgrounded_enabled = enabled;
    }

    pub fn suspend_timer_queue(&self) {
        if self.is_shutdown() {
            return;
        }
        self.main_thread_only().timer_queue_suspend_count += 1;
        self.force_update_policy();
    }

    /// Undo one [`suspend_timer_queue`](Self::suspend_timer_queue). Extra
    /// calls are ignored.
    pub fn resume_timer_queue(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            main.timer_queue_suspend_count = main.timer_queue_suspend_count.saturating_sub(1);
        }
        self.force_update_policy();
    }

    pub fn set_expensive_task_blocking_allowed(&self, allowed: bool) {
        if self.is_shutdown() {
            return;
        }
        self.main_thread_only().expensive_task_blocking_allowed = allowed;
        self.force_update_policy();
    }

    /// Switch the throttleable queues to virtual time. There is no way back.
    pub fn enable_virtual_time(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let mut main = self.main_thread_only();
            if main.use_virtual_time {
                return;
            }
            main.use_virtual_time = true;
        }
        info!("virtual time enabled");
        self.force_update_policy();
    }

    // ── Navigation ──────────────────────────────────────────────

    pub fn add_pending_navigation(&self, frame_type: NavigatingFrameType) {
        if self.is_shutdown() || frame_type != NavigatingFrameType::MainFrame {
            return;
        }
        self.main_thread_only().navigation_task_expected_count += 1;
        self.update_policy();
    }

    pub fn remove_pending_navigation(&self, frame_type: NavigatingFrameType) {
        if self.is_shutdown() || frame_type != NavigatingFrameType::MainFrame {
            return;
        }
        {
            let mut main = self.main_thread_only();
            main.navigation_task_expected_count = main.navigation_task_expected_count.saturating_sub(1);
        }
        self.update_policy();
    }

    /// A new document started loading: forget the previous page.
    pub fn on_navigation_started(&self) {
        if self.is_shutdown() {
            return;
        }
        let now = self.now();
        let mut any = self.any_thread();
        any.user_model.reset(now);
        any.rails_loading_priority_deadline = Some(now + self.config.policy.rails_initial_loading_prioritization());
        {
            let mut main = self.main_thread_only();
            main.loading_task_cost_estimator.clear();
            main.timer_task_cost_estimator.clear();
            main.idle_time_estimator.clear();
            main.have_seen_a_begin_main_frame = false;
            main.have_reported_blocking_intervention_since_navigation = false;
        }
        info!("navigation started");
        self.update_policy_locked(&mut any, UpdateType::MayEarlyOutIfPolicyUnchanged);
    }
}
