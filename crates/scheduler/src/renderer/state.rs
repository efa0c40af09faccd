//! The three state partitions of the scheduler.
//!
//! `AnyThread` is shared with input producers and guarded by a mutex.
//! `MainThreadOnly` and `CompositorThreadOnly` are confined to one thread
//! each; their accessors check the calling thread in debug builds.

use std::sync::{Arc, MutexGuard, RwLock};
use std::thread;
use std::time::Duration;

use atomic_refcell::AtomicRefMut;
use cadence_core::{SchedulerConfig, TimeTicks};
use tracing::debug;

use crate::deadline_task_runner::DeadlineTaskRunner;
use crate::estimators::{IdleTimeEstimator, QueueingTimeEstimator, TaskCostEstimator, ThreadLoadTracker};
use crate::input::InputEventType;
use crate::metrics::SchedulerMetrics;
use crate::queue::QueueId;
use crate::user_model::UserModel;

use super::types::{ExpensiveTaskPolicy, Policy, RailModeObserver, UseCase};
use super::RendererScheduler;

pub(super) const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// State read and written from both the main and the compositor thread.
#[derive(Debug, Default)]
pub(super) struct AnyThread {
    pub last_idle_period_end_time: Option<TimeTicks>,
    pub rails_loading_priority_deadline: Option<TimeTicks>,
    pub fling_compositor_escalation_deadline: Option<TimeTicks>,
    pub user_model: UserModel,
    pub awaiting_touch_start_response: bool,
    pub in_idle_period: bool,
    pub begin_main_frame_on_critical_path: bool,
    pub last_gesture_was_compositor_driven: bool,
    pub default_gesture_prevented: bool,
}

#[derive(Debug)]
pub(super) struct CompositorThreadOnly {
    pub last_input_type: InputEventType,
}

impl Default for CompositorThreadOnly {
    fn default() -> Self {
        Self {
            last_input_type: InputEventType::Undefined,
        }
    }
}

pub(super) struct MainThreadOnly {
    pub loading_task_cost_estimator: TaskCostEstimator,
    pub timer_task_cost_estimator: TaskCostEstimator,
    pub idle_time_estimator: IdleTimeEstimator,
    pub queueing_time_estimator: QueueingTimeEstimator,
    pub foreground_main_thread_load_tracker: ThreadLoadTracker,
    pub background_main_thread_load_tracker: ThreadLoadTracker,
    pub delayed_update_policy_runner: DeadlineTaskRunner,
    pub rail_mode_observer: Option<Arc<dyn RailModeObserver>>,

    pub loading_queues: Vec<QueueId>,
    pub timer_queues: Vec<QueueId>,
    pub unthrottled_queues: Vec<QueueId>,

    pub current_use_case: UseCase,
    pub current_policy: Policy,
    pub current_policy_expiration_time: Option<TimeTicks>,
    pub expensive_task_policy: ExpensiveTaskPolicy,
    pub estimated_next_frame_begin: Option<TimeTicks>,
    pub compositor_frame_interval: Duration,
    pub longest_jank_free_task_duration: Duration,
    pub hidden_since: Option<TimeTicks>,

    pub timer_queue_suspend_count: usize,
    pub navigation_task_expected_count: usize,
    /// Invalidates a pending "end idle while hidden" task.
    pub hidden_idle_generation: u64,
    /// Invalidates a pending "suspend timers while backgrounded" task.
    pub suspend_timers_generation: u64,

    pub renderer_hidden: bool,
    pub renderer_backgrounded: bool,
    pub renderer_suspended: bool,
    pub timer_queue_suspension_when_backgrounded_enabled: bool,
    pub timer_queue_suspended_when_backgrounded: bool,
    pub loading_tasks_seem_expensive: bool,
    pub timer_tasks_seem_expensive: bool,
    pub touchstart_expected_soon: bool,
    pub have_seen_a_begin_main_frame: bool,
    pub have_reported_blocking_intervention_since_navigation: bool,
    pub has_visible_render_widget_with_touch_handler: bool,
    pub begin_frame_not_expected_soon: bool,
    pub expensive_task_blocking_allowed: bool,
    pub use_virtual_time: bool,
}

impl RendererScheduler {
    pub(super) fn any_thread(&self) -> MutexGuard<'_, AnyThread> {
        self.any_thread.lock().unwrap()
    }

    pub(super) fn main_thread_only(&self) -> AtomicRefMut<'_, MainThreadOnly> {
        debug_assert_eq!(
            thread::current().id(),
            self.main_thread_id,
            "main thread state accessed from another thread"
        );
        self.main_thread_only.borrow_mut()
    }

    /// Binds to whichever thread first delivers compositor signals.
    pub(super) fn compositor_thread_only(&self) -> AtomicRefMut<'_, CompositorThreadOnly> {
        let current = thread::current().id();
        let bound = *self.compositor_thread_id.get_or_init(|| current);
        debug_assert_eq!(current, bound, "compositor state accessed from another thread");
        self.compositor_thread_only.borrow_mut()
    }
}

impl MainThreadOnly {
    pub(super) fn new(
        config: &SchedulerConfig,
        now: TimeTicks,
        metrics: &Arc<RwLock<SchedulerMetrics>>,
        delayed_update_policy_runner: DeadlineTaskRunner,
        default_loading_queue: QueueId,
        default_timer_queue: QueueId,
    ) -> Self {
        let estimators = &config.estimators;
        let diagnostics = &config.diagnostics;

        let foreground_metrics = Arc::clone(metrics);
        let foreground_main_thread_load_tracker = ThreadLoadTracker::new(
            now,
            move |time: TimeTicks, load: f64| {
                debug!(%time, load, "foreground main thread load");
                foreground_metrics.write().unwrap().record_load(true, load);
            },
            diagnostics.load_reporting_interval(),
            diagnostics.load_waiting_period(),
        );
        let background_metrics = Arc::clone(metrics);
        let mut background_main_thread_load_tracker = ThreadLoadTracker::new(
            now,
            move |time: TimeTicks, load: f64| {
                debug!(%time, load, "background main thread load");
                background_metrics.write().unwrap().record_load(false, load);
            },
            diagnostics.load_reporting_interval(),
            diagnostics.load_waiting_period(),
        );
        // Renderers start in the foreground.
        background_main_thread_load_tracker.pause(now);

        Self {
            loading_task_cost_estimator: TaskCostEstimator::new(
                estimators.loading_task_estimator_sample_count,
                estimators.loading_task_estimator_percentile,
            ),
            timer_task_cost_estimator: TaskCostEstimator::new(
                estimators.timer_task_estimator_sample_count,
                estimators.timer_task_estimator_percentile,
            ),
            idle_time_estimator: IdleTimeEstimator::new(
                estimators.short_idle_period_sample_count,
                estimators.short_idle_period_percentile,
            ),
            queueing_time_estimator: QueueingTimeEstimator::new(diagnostics.queueing_time_window()),
            foreground_main_thread_load_tracker,
            background_main_thread_load_tracker,
            delayed_update_policy_runner,
            rail_mode_observer: None,
            loading_queues: vec![default_loading_queue],
            timer_queues: vec![default_timer_queue],
            unthrottled_queues: Vec::new(),
            current_use_case: UseCase::None,
            current_policy: Policy::default(),
            current_policy_expiration_time: None,
            expensive_task_policy: ExpensiveTaskPolicy::Run,
            estimated_next_frame_begin: None,
            compositor_frame_interval: DEFAULT_FRAME_INTERVAL,
            longest_jank_free_task_duration: Duration::ZERO,
            hidden_since: None,
            timer_queue_suspend_count: 0,
            navigation_task_expected_count: 0,
            hidden_idle_generation: 0,
            suspend_timers_generation: 0,
            renderer_hidden: false,
            renderer_backgrounded: false,
            renderer_suspended: false,
            timer_queue_suspension_when_backgrounded_enabled: config
                .policy
                .timer_queue_suspension_when_backgrounded,
            timer_queue_suspended_when_backgrounded: false,
            loading_tasks_seem_expensive: false,
            timer_tasks_seem_expensive: false,
            touchstart_expected_soon: false,
            have_seen_a_begin_main_frame: false,
            have_reported_blocking_intervention_since_navigation: false,
            has_visible_render_widget_with_touch_handler: false,
            begin_frame_not_expected_soon: false,
            expensive_task_blocking_allowed: true,
            use_virtual_time: false,
        }
    }
}
