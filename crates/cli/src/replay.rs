//! Drives a scheduler on a simulated clock from trace records.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use cadence_core::{SchedulerConfig, TestTickClock, TickClock, TimeTicks};
use cadence_scheduler::{
    BeginFrameArgs, IdlePeriodTracker, InputEventState, Policy, RendererScheduler, SchedulerMetrics,
    SimpleTaskQueueManager, TaskRunner, UseCase,
};

use crate::trace::{input_event, TraceEvent, TraceQueue, TraceRecord};

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub at_ms: u64,
    pub from: UseCase,
    pub to: UseCase,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub tasks_run: usize,
    pub duration_ms: u64,
    pub final_use_case: UseCase,
    pub final_policy: Policy,
    pub transitions: Vec<Transition>,
    pub metrics: SchedulerMetrics,
}

pub struct Replayer {
    clock: Arc<TestTickClock>,
    manager: Arc<SimpleTaskQueueManager>,
    scheduler: Arc<RendererScheduler>,
    // Keeps the idle helper alive; the scheduler only holds it as a trait object.
    _idle: Arc<IdlePeriodTracker>,
    last_use_case: UseCase,
    transitions: Vec<Transition>,
    events: usize,
    tasks_run: usize,
}

impl Replayer {
    pub fn new(config: SchedulerConfig, virtual_time: bool) -> Self {
        let clock = Arc::new(TestTickClock::new());
        let manager = Arc::new(SimpleTaskQueueManager::new(clock.clone()));
        let (scheduler, idle) = RendererScheduler::with_idle_tracker(manager.clone(), clock.clone(), config);
        if virtual_time {
            scheduler.enable_virtual_time();
        }
        Self {
            clock,
            manager,
            scheduler,
            _idle: idle,
            last_use_case: UseCase::None,
            transitions: Vec::new(),
            events: 0,
            tasks_run: 0,
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ticks().since_origin().as_millis() as u64
    }

    /// Apply one record, calling `on_transition` for every use case change
    /// it causes.
    pub fn apply(&mut self, record: &TraceRecord, on_transition: &mut dyn FnMut(&Transition)) {
        self.advance_to(TimeTicks::from_millis(record.at_ms), on_transition);
        debug!(at_ms = record.at_ms, event = ?record.event, "replaying event");
        self.dispatch(&record.event);
        self.events += 1;
        self.drain(on_transition);
    }

    /// Keep running for `settle` past the last event so pending expirations
    /// land, then report. Gesture expectations re-arm themselves, so the
    /// queue never fully empties on its own.
    pub fn finish(mut self, settle: Duration, on_transition: &mut dyn FnMut(&Transition)) -> ReplayReport {
        let end = self.clock.now_ticks() + settle;
        self.advance_to(end, on_transition);
        ReplayReport {
            events: self.events,
            tasks_run: self.tasks_run,
            duration_ms: self.now_ms(),
            final_use_case: self.scheduler.current_use_case(),
            final_policy: self.scheduler.current_policy(),
            transitions: self.transitions,
            metrics: self.scheduler.metrics(),
        }
    }

    /// Move the clock to `target`, running delayed work as it falls due.
    fn advance_to(&mut self, target: TimeTicks, on_transition: &mut dyn FnMut(&Transition)) {
        loop {
            self.drain(on_transition);
            let now = self.clock.now_ticks();
            match self.manager.next_pending_delay() {
                Some(delay) if now + delay <= target => self.clock.advance(delay),
                _ => break,
            }
        }
        // No-op when a long task already carried the clock past the target.
        self.clock.set(target);
        self.drain(on_transition);
    }

    fn drain(&mut self, on_transition: &mut dyn FnMut(&Transition)) {
        while self.manager.run_next_task() {
            self.tasks_run += 1;
            self.note_use_case(on_transition);
        }
        self.note_use_case(on_transition);
    }

    fn note_use_case(&mut self, on_transition: &mut dyn FnMut(&Transition)) {
        let use_case = self.scheduler.current_use_case();
        if use_case == self.last_use_case {
            return;
        }
        let transition = Transition {
            at_ms: self.now_ms(),
            from: self.last_use_case,
            to: use_case,
        };
        on_transition(&transition);
        self.transitions.push(transition);
        self.last_use_case = use_case;
    }

    fn runner(&self, queue: TraceQueue) -> TaskRunner {
        match queue {
            TraceQueue::Control => self.scheduler.control_task_runner(),
            TraceQueue::Default => self.scheduler.default_task_runner(),
            TraceQueue::Compositor => self.scheduler.compositor_task_runner(),
            TraceQueue::Loading => self.scheduler.loading_task_runner(),
            TraceQueue::Timer => self.scheduler.timer_task_runner(),
        }
    }

    fn dispatch(&self, event: &TraceEvent) {
        let scheduler = &self.scheduler;
        match *event {
            TraceEvent::Input {
                event_type,
                left_button_down,
                consumed,
            } => {
                let state = if consumed {
                    InputEventState::EventConsumedByCompositor
                } else {
                    InputEventState::EventForwardedToMainThread
                };
                scheduler
                    .did_handle_input_event_on_compositor_thread(&input_event(event_type, left_button_down), state);
            }
            TraceEvent::MainThreadInput {
                event_type,
                left_button_down,
                result,
            } => {
                scheduler.did_handle_input_event_on_main_thread(&input_event(event_type, left_button_down), result);
            }
            TraceEvent::BeginFrame {
                interval_ms,
                on_critical_path,
            } => {
                let mut args = BeginFrameArgs::new(self.clock.now_ticks(), Duration::from_millis(interval_ms));
                if !on_critical_path {
                    args = args.off_critical_path();
                }
                scheduler.will_begin_frame(args);
            }
            TraceEvent::CommitFrame => scheduler.did_commit_frame_to_compositor(),
            TraceEvent::BeginFrameNotExpectedSoon => scheduler.begin_frame_not_expected_soon(),
            TraceEvent::AnimateForInput => scheduler.did_animate_for_input_on_compositor_thread(),
            TraceEvent::Task { queue, duration_ms } => {
                let clock = Arc::clone(&self.clock);
                self.runner(queue)
                    .post_task(move || clock.advance(Duration::from_millis(duration_ms)));
            }
            TraceEvent::NavigationStarted => scheduler.on_navigation_started(),
            TraceEvent::AddPendingNavigation { frame } => scheduler.add_pending_navigation(frame),
            TraceEvent::RemovePendingNavigation { frame } => scheduler.remove_pending_navigation(frame),
            TraceEvent::Backgrounded => scheduler.on_renderer_backgrounded(),
            TraceEvent::Foregrounded => scheduler.on_renderer_foregrounded(),
            TraceEvent::Suspend => scheduler.suspend_renderer(),
            TraceEvent::Resume => scheduler.resume_renderer(),
            TraceEvent::Hidden => scheduler.set_all_render_widgets_hidden(true),
            TraceEvent::Visible => scheduler.set_all_render_widgets_hidden(false),
            TraceEvent::TouchHandler { present } => {
                scheduler.set_has_visible_render_widget_with_touch_handler(present)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::parse_trace;

    fn replay(trace: &str) -> (ReplayReport, Vec<Transition>) {
        let records = parse_trace(trace.as_bytes()).unwrap();
        let mut seen = Vec::new();
        let mut replayer = Replayer::new(SchedulerConfig::default(), false);
        let mut record_transition = |t: &Transition| seen.push(t.clone());
        for record in &records {
            replayer.apply(record, &mut record_transition);
        }
        let report = replayer.finish(Duration::from_secs(2), &mut record_transition);
        (report, seen)
    }

    #[test]
    fn navigation_then_idle() {
        let (report, seen) = replay(
            r#"{"at_ms": 100, "event": "navigation_started"}
{"at_ms": 200, "event": "task", "queue": "loading", "duration_ms": 20}"#,
        );
        let path: Vec<_> = seen.iter().map(|t| (t.at_ms, t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![(100, UseCase::None, UseCase::Loading), (1100, UseCase::Loading, UseCase::None)]
        );
        assert_eq!(report.events, 2);
        assert_eq!(report.final_use_case, UseCase::None);
        assert_eq!(report.transitions.len(), 2);
        assert!(report.tasks_run >= 2);
    }

    #[test]
    fn touchstart_is_reported() {
        let (report, seen) = replay(
            r#"{"at_ms": 10, "event": "input", "type": "touch_start"}
{"at_ms": 20, "event": "main_thread_input", "type": "touch_start"}"#,
        );
        assert_eq!(seen[0].to, UseCase::Touchstart);
        assert_eq!(seen[0].at_ms, 10);
        assert_eq!(report.final_use_case, UseCase::None);
        assert_eq!(seen[1].at_ms, 120);
        assert_eq!(seen[1].to, UseCase::None);
        assert_eq!(report.duration_ms, 2020);
    }
}
