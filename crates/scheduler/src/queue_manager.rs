//! Single-threaded reference executor for the [`TaskQueueManager`] seam.

use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use cadence_core::{TickClock, TimeTicks};
use tracing::trace;

use crate::queue::{QueueId, QueuePriority, Task, TaskObserver, TaskQueueManager, TimeDomainType};

const THROTTLED_WAKE_UP_INTERVAL: Duration = Duration::from_secs(1);

struct PendingTask {
    location: &'static Location<'static>,
    task: Task,
}

struct QueueState {
    name: String,
    enabled: bool,
    priority: QueuePriority,
    time_domain: TimeDomainType,
    /// Keyed by (desired run time, post sequence).
    tasks: BTreeMap<(TimeTicks, u64), PendingTask>,
}

impl QueueState {
    /// Earliest time the front task may run under this queue's time domain.
    fn front_ready_time(&self) -> Option<((TimeTicks, u64), TimeTicks)> {
        let (&key, _) = self.tasks.iter().next()?;
        let ready = match self.time_domain {
            TimeDomainType::Real => key.0,
            TimeDomainType::Throttled => align_to_wake_up(key.0),
            TimeDomainType::Virtual => TimeTicks::ZERO,
        };
        Some((key, ready))
    }
}

fn align_to_wake_up(time: TimeTicks) -> TimeTicks {
    let interval = THROTTLED_WAKE_UP_INTERVAL.as_nanos();
    let nanos = time.since_origin().as_nanos();
    let aligned = nanos.div_ceil(interval) * interval;
    TimeTicks::from_duration(Duration::from_nanos(aligned as u64))
}

#[derive(Default)]
struct Inner {
    queues: Vec<QueueState>,
    next_sequence: u64,
}

/// Runs tasks from the highest-priority enabled queue with a ready task.
///
/// Ready tasks of equal priority run in desired-time then post order.
/// Throttled queues only wake on whole seconds; virtual queues treat every
/// task as due.
pub struct SimpleTaskQueueManager {
    clock: Arc<dyn TickClock>,
    inner: Mutex<Inner>,
    observers: RwLock<Vec<Weak<dyn TaskObserver>>>,
}

impl SimpleTaskQueueManager {
    pub fn new(clock: Arc<dyn TickClock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn clock(&self) -> Arc<dyn TickClock> {
        Arc::clone(&self.clock)
    }

    /// Run ready tasks until none are left; returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next_task() {
            ran += 1;
        }
        ran
    }

    /// Run the single best ready task, if any.
    pub fn run_next_task(&self) -> bool {
        let Some((queue, pending)) = self.take_next_ready_task() else {
            return false;
        };
        trace!(%queue, from = %pending.location, "running task");

        let observers = self.live_observers();
        let start = self.clock.now_ticks();
        for observer in &observers {
            observer.will_process_task(queue, start);
        }
        (pending.task)();
        let end = self.clock.now_ticks();
        for observer in &observers {
            observer.did_process_task(queue, start, end);
        }
        true
    }

    /// Time until the next task of an enabled queue becomes ready, or
    /// `None` when every enabled queue is empty.
    pub fn next_pending_delay(&self) -> Option<Duration> {
        let now = self.clock.now_ticks();
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .iter()
            .filter(|q| q.enabled)
            .filter_map(QueueState::front_ready_time)
            .map(|(_, ready)| ready - now)
            .min()
    }

    pub fn pending_task_count(&self, queue: QueueId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(queue.0).map_or(0, |q| q.tasks.len())
    }

    pub fn queue_name(&self, queue: QueueId) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(queue.0).map(|q| q.name.clone())
    }

    /// Current (enabled, priority, time domain) of a queue.
    pub fn queue_settings(&self, queue: QueueId) -> Option<(bool, QueuePriority, TimeDomainType)> {
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .get(queue.0)
            .map(|q| (q.enabled, q.priority, q.time_domain))
    }

    fn take_next_ready_task(&self) -> Option<(QueueId, PendingTask)> {
        let now = self.clock.now_ticks();
        let mut inner = self.inner.lock().unwrap();

        let mut best: Option<(QueuePriority, (TimeTicks, u64), usize)> = None;
        for (idx, queue) in inner.queues.iter().enumerate() {
            if !queue.enabled {
                continue;
            }
            let Some((key, ready)) = queue.front_ready_time() else {
                continue;
            };
            if ready > now {
                continue;
            }
            let candidate = (queue.priority, key, idx);
            if best.map_or(true, |b| (candidate.0, candidate.1) < (b.0, b.1)) {
                best = Some(candidate);
            }
        }

        let (_, key, idx) = best?;
        let pending = inner.queues[idx].tasks.remove(&key)?;
        Some((QueueId(idx), pending))
    }

    fn live_observers(&self) -> Vec<Arc<dyn TaskObserver>> {
        let mut observers = self.observers.write().unwrap();
        observers.retain(|o| o.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }

    fn enqueue(
        &self,
        queue: QueueId,
        location: &'static Location<'static>,
        task: Task,
        delay: Duration,
    ) {
        let run_at = self.clock.now_ticks() + delay;
        let mut inner = self.inner.lock().unwrap();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        match inner.queues.get_mut(queue.0) {
            Some(state) => {
                trace!(queue = %state.name, from = %location, delay_ms = delay.as_millis() as u64, "task posted");
                state
                    .tasks
                    .insert((run_at, sequence), PendingTask { location, task });
            }
            None => debug_assert!(false, "post to unknown queue {queue}"),
        }
    }

    fn with_queue(&self, queue: QueueId, f: impl FnOnce(&mut QueueState)) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.queues.get_mut(queue.0) {
            f(state);
        }
    }
}

impl TaskQueueManager for SimpleTaskQueueManager {
    fn new_queue(&self, name: &str) -> QueueId {
        let mut inner = self.inner.lock().unwrap();
        inner.queues.push(QueueState {
            name: name.to_string(),
            enabled: true,
            priority: QueuePriority::Normal,
            time_domain: TimeDomainType::Real,
            tasks: BTreeMap::new(),
        });
        QueueId(inner.queues.len() - 1)
    }

    fn post_task(&self, queue: QueueId, location: &'static Location<'static>, task: Task) {
        self.enqueue(queue, location, task, Duration::ZERO);
    }

    fn post_delayed_task(
        &self,
        queue: QueueId,
        location: &'static Location<'static>,
        task: Task,
        delay: Duration,
    ) {
        self.enqueue(queue, location, task, delay);
    }

    fn set_queue_enabled(&self, queue: QueueId, enabled: bool) {
        self.with_queue(queue, |q| q.enabled = enabled);
    }

    fn set_queue_priority(&self, queue: QueueId, priority: QueuePriority) {
        self.with_queue(queue, |q| q.priority = priority);
    }

    fn set_time_domain(&self, queue: QueueId, time_domain: TimeDomainType) {
        self.with_queue(queue, |q| q.time_domain = time_domain);
    }

    fn has_pending_immediate_work(&self, queue: QueueId) -> bool {
        let now = self.clock.now_ticks();
        let inner = self.inner.lock().unwrap();
        inner
            .queues
            .get(queue.0)
            .and_then(QueueState::front_ready_time)
            .is_some_and(|(_, ready)| ready <= now)
    }

    fn add_task_observer(&self, observer: Weak<dyn TaskObserver>) {
        self.observers.write().unwrap().push(observer);
    }
}
