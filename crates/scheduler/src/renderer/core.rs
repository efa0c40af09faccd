use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use atomic_refcell::AtomicRefCell;
use cadence_core::{SchedulerConfig, TickClock, TimeTicks};
use tracing::{debug, info};

use crate::deadline_task_runner::DeadlineTaskRunner;
use crate::estimators::QueueingTimeEstimatorClient;
use crate::idle::{IdleHelper, IdleHelperDelegate, IdlePeriodTracker};
use crate::metrics::SchedulerMetrics;
use crate::queue::{QueueId, QueuePriority, TaskObserver, TaskQueueManager, TaskRunner};

use super::state::{AnyThread, CompositorThreadOnly, MainThreadOnly};
use super::types::{ExpensiveTaskPolicy, Policy, RailMode, RailModeObserver, TaskQueuePolicy, UseCase};

/// Renderer main thread scheduler.
///
/// Watches input, frame and lifecycle signals, guesses what the user is
/// doing and reprioritizes the task queues accordingly. Must be created on
/// the thread that will run its queues.
pub struct RendererScheduler {
    pub(super) config: SchedulerConfig,
    pub(super) clock: Arc<dyn TickClock>,
    pub(super) queue_manager: Arc<dyn TaskQueueManager>,
    pub(super) idle_helper: Arc<dyn IdleHelper>,
    pub(super) weak_self: Weak<RendererScheduler>,

    pub(super) control_queue: QueueId,
    pub(super) compositor_queue: QueueId,
    pub(super) default_queue: QueueId,
    pub(super) default_loading_queue: QueueId,
    pub(super) default_timer_queue: QueueId,

    pub(super) any_thread: Mutex<AnyThread>,
    pub(super) main_thread_only: AtomicRefCell<MainThreadOnly>,
    pub(super) compositor_thread_only: AtomicRefCell<CompositorThreadOnly>,
    pub(super) main_thread_id: ThreadId,
    pub(super) compositor_thread_id: OnceLock<ThreadId>,

    /// Set by any thread that wants the main thread to recompute policy.
    pub(super) policy_may_need_update: AtomicBool,
    pub(super) was_shutdown: AtomicBool,
    /// Stands in for the last idle period end until one has ended.
    pub(super) created_at: TimeTicks,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
}

impl RendererScheduler {
    pub fn new(
        queue_manager: Arc<dyn TaskQueueManager>,
        idle_helper: Arc<dyn IdleHelper>,
        clock: Arc<dyn TickClock>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let control_queue = queue_manager.new_queue("control_tq");
        queue_manager.set_queue_priority(control_queue, QueuePriority::Control);
        let compositor_queue = queue_manager.new_queue("compositor_tq");
        let default_queue = queue_manager.new_queue("default_tq");
        let default_loading_queue = queue_manager.new_queue("default_loading_tq");
        let default_timer_queue = queue_manager.new_queue("default_timer_tq");

        let now = clock.now_ticks();
        let metrics = Arc::new(RwLock::new(SchedulerMetrics::default()));

        let scheduler = Arc::new_cyclic(|weak_self: &Weak<Self>| {
            let target = weak_self.clone();
            let delayed_update_policy_runner = DeadlineTaskRunner::new(
                move || {
                    if let Some(scheduler) = target.upgrade() {
                        scheduler.update_policy();
                    }
                },
                TaskRunner::new(Arc::clone(&queue_manager), control_queue),
            );
            let main_thread_only = MainThreadOnly::new(
                &config,
                now,
                &metrics,
                delayed_update_policy_runner,
                default_loading_queue,
                default_timer_queue,
            );

            Self {
                config,
                clock,
                queue_manager,
                idle_helper,
                weak_self: weak_self.clone(),
                control_queue,
                compositor_queue,
                default_queue,
                default_loading_queue,
                default_timer_queue,
                any_thread: Mutex::new(AnyThread::default()),
                main_thread_only: AtomicRefCell::new(main_thread_only),
                compositor_thread_only: AtomicRefCell::new(CompositorThreadOnly::default()),
                main_thread_id: thread::current().id(),
                compositor_thread_id: OnceLock::new(),
                policy_may_need_update: AtomicBool::new(false),
                was_shutdown: AtomicBool::new(false),
                created_at: now,
                metrics,
            }
        });

        let observer: Arc<dyn TaskObserver> = scheduler.clone();
        scheduler.queue_manager.add_task_observer(Arc::downgrade(&observer));

        info!(
            control = %control_queue,
            compositor = %compositor_queue,
            default = %default_queue,
            loading = %default_loading_queue,
            timer = %default_timer_queue,
            "renderer scheduler created"
        );
        scheduler
    }

    /// Build a scheduler driven by a fresh [`IdlePeriodTracker`] that
    /// consults it on every long idle period.
    pub fn with_idle_tracker(
        queue_manager: Arc<dyn TaskQueueManager>,
        clock: Arc<dyn TickClock>,
        config: SchedulerConfig,
    ) -> (Arc<Self>, Arc<IdlePeriodTracker>) {
        let tracker = Arc::new(IdlePeriodTracker::new());
        let idle_helper: Arc<dyn IdleHelper> = tracker.clone();
        let scheduler = Self::new(queue_manager, idle_helper, clock, config);
        let delegate: Arc<dyn IdleHelperDelegate> = scheduler.clone();
        tracker.set_delegate(Arc::downgrade(&delegate));
        (scheduler, tracker)
    }

    pub(super) fn now(&self) -> TimeTicks {
        self.clock.now_ticks()
    }

    pub fn is_shutdown(&self) -> bool {
        self.was_shutdown.load(Ordering::Acquire)
    }

    /// Stop reacting to signals. Queues keep whatever policy they had.
    pub fn shutdown(&self) {
        if self.was_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.main_thread_only().delayed_update_policy_runner.cancel();
        info!("renderer scheduler shut down");
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ── Task runners ────────────────────────────────────────────

    fn runner(&self, queue: QueueId) -> TaskRunner {
        TaskRunner::new(Arc::clone(&self.queue_manager), queue)
    }

    pub fn default_task_runner(&self) -> TaskRunner {
        self.runner(self.default_queue)
    }

    pub fn compositor_task_runner(&self) -> TaskRunner {
        self.runner(self.compositor_queue)
    }

    pub fn loading_task_runner(&self) -> TaskRunner {
        self.runner(self.default_loading_queue)
    }

    pub fn timer_task_runner(&self) -> TaskRunner {
        self.runner(self.default_timer_queue)
    }

    pub fn control_task_runner(&self) -> TaskRunner {
        self.runner(self.control_queue)
    }

    /// A new loading queue that follows the loading policy from now on.
    pub fn new_loading_task_runner(&self, name: &str) -> TaskRunner {
        let queue = self.queue_manager.new_queue(name);
        let policy = {
            let mut main = self.main_thread_only();
            main.loading_queues.push(queue);
            main.current_policy.loading_queue_policy
        };
        self.apply_task_queue_policy(queue, &TaskQueuePolicy::default(), &policy);
        debug!(%queue, name, "loading queue created");
        self.runner(queue)
    }

    /// A new timer queue that follows the timer policy from now on.
    pub fn new_timer_task_runner(&self, name: &str) -> TaskRunner {
        let queue = self.queue_manager.new_queue(name);
        let policy = {
            let mut main = self.main_thread_only();
            main.timer_queues.push(queue);
            main.current_policy.timer_queue_policy
        };
        self.apply_task_queue_policy(queue, &TaskQueuePolicy::default(), &policy);
        debug!(%queue, name, "timer queue created");
        self.runner(queue)
    }

    /// A queue no policy ever disables, throttles or virtualizes.
    pub fn new_unthrottled_task_runner(&self, name: &str) -> TaskRunner {
        let queue = self.queue_manager.new_queue(name);
        self.main_thread_only().unthrottled_queues.push(queue);
        debug!(%queue, name, "unthrottled queue created");
        self.runner(queue)
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn current_use_case(&self) -> UseCase {
        self.main_thread_only().current_use_case
    }

    pub fn current_policy(&self) -> Policy {
        self.main_thread_only().current_policy
    }

    pub fn rail_mode(&self) -> RailMode {
        self.main_thread_only().current_policy.rail_mode
    }

    pub fn expensive_task_policy(&self) -> ExpensiveTaskPolicy {
        self.main_thread_only().expensive_task_policy
    }

    /// When the current use case is next re-evaluated, if ever.
    pub fn policy_expiration_time(&self) -> Option<TimeTicks> {
        self.main_thread_only().current_policy_expiration_time
    }

    pub fn longest_jank_free_task_duration(&self) -> Duration {
        self.main_thread_only().longest_jank_free_task_duration
    }

    pub fn loading_tasks_seem_expensive(&self) -> bool {
        self.main_thread_only().loading_tasks_seem_expensive
    }

    pub fn timer_tasks_seem_expensive(&self) -> bool {
        self.main_thread_only().timer_tasks_seem_expensive
    }

    pub fn touchstart_expected_soon(&self) -> bool {
        self.main_thread_only().touchstart_expected_soon
    }

    /// Snapshot of the scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn metrics_handle(&self) -> Arc<RwLock<SchedulerMetrics>> {
        Arc::clone(&self.metrics)
    }

    pub fn set_rail_mode_observer(&self, observer: Option<Arc<dyn RailModeObserver>>) {
        self.main_thread_only().rail_mode_observer = observer;
    }

    /// Whether input or a new gesture is likely to need the main thread soon.
    pub fn is_high_priority_work_anticipated(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        self.maybe_update_policy();
        let main = self.main_thread_only();
        main.touchstart_expected_soon
            || matches!(
                main.current_use_case,
                UseCase::Touchstart
                    | UseCase::MainThreadGesture
                    | UseCase::MainThreadCustomInputHandling
                    | UseCase::SynchronizedGesture
            )
    }

    /// Whether a long-running task should yield to let input through.
    pub fn should_yield_for_high_priority_work(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        self.maybe_update_policy();
        let main = self.main_thread_only();
        match main.current_use_case {
            UseCase::CompositorGesture | UseCase::None => main.touchstart_expected_soon,
            UseCase::MainThreadGesture
            | UseCase::MainThreadCustomInputHandling
            | UseCase::SynchronizedGesture => {
                main.touchstart_expected_soon
                    || self
                        .queue_manager
                        .has_pending_immediate_work(self.compositor_queue)
            }
            UseCase::Touchstart => true,
            UseCase::Loading => false,
        }
    }
}

// ── Task observation ────────────────────────────────────────────

struct QueueingTimeRecorder<'a> {
    metrics: &'a RwLock<SchedulerMetrics>,
}

impl QueueingTimeEstimatorClient for QueueingTimeRecorder<'_> {
    fn on_queueing_time_for_window_estimated(&mut self, queueing_time: Duration) {
        debug!(
            queueing_time_ms = queueing_time.as_secs_f64() * 1000.0,
            "expected queueing time for window"
        );
        self.metrics.write().unwrap().record_queueing_time(queueing_time);
    }
}

impl TaskObserver for RendererScheduler {
    fn will_process_task(&self, queue: QueueId, start: TimeTicks) {
        if self.is_shutdown() {
            return;
        }
        let mut main = self.main_thread_only();
        if queue == self.compositor_queue {
            main.idle_time_estimator.will_process_task(start);
        } else if main.loading_queues.contains(&queue) {
            main.loading_task_cost_estimator.will_process_task(start);
        } else if main.timer_queues.contains(&queue) {
            main.timer_task_cost_estimator.will_process_task(start);
        }
    }

    fn did_process_task(&self, queue: QueueId, start: TimeTicks, end: TimeTicks) {
        if self.is_shutdown() {
            return;
        }
        let mut guard = self.main_thread_only();
        let main = &mut *guard;
        if queue == self.compositor_queue {
            main.idle_time_estimator.did_process_task(end);
        } else if main.loading_queues.contains(&queue) {
            main.loading_task_cost_estimator.did_process_task(end);
        } else if main.timer_queues.contains(&queue) {
            main.timer_task_cost_estimator.did_process_task(end);
        }

        let mut recorder = QueueingTimeRecorder {
            metrics: &self.metrics,
        };
        main.queueing_time_estimator
            .on_toplevel_task_completed(&mut recorder, start, end);
        main.foreground_main_thread_load_tracker.record_task_time(start, end);
        main.background_main_thread_load_tracker.record_task_time(start, end);
    }
}
