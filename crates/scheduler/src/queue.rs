//! Seam between the scheduler and whatever stores and runs tasks.

use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cadence_core::TimeTicks;
use serde::{Deserialize, Serialize};

/// Stable handle of a queue created by a [`TaskQueueManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub usize);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Queue priority. Lower variants run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    /// Scheduler-internal work; always first.
    Control,
    Highest,
    High,
    Normal,
    Low,
    /// Runs only when nothing else is ready.
    BestEffort,
}

/// Which clock decides when a queue's delayed tasks become runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeDomainType {
    Real,
    /// Wake-ups aligned to whole seconds.
    Throttled,
    /// Time advances as fast as the queue drains.
    Virtual,
}

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Notified around every task a queue manager runs.
pub trait TaskObserver: Send + Sync {
    fn will_process_task(&self, queue: QueueId, start: TimeTicks);
    fn did_process_task(&self, queue: QueueId, start: TimeTicks, end: TimeTicks);
}

/// Storage and dispatch of tasks across named queues.
///
/// The scheduler only creates queues, posts to them and flips their
/// enabled/priority/time-domain knobs; running tasks is up to the
/// implementation.
pub trait TaskQueueManager: Send + Sync {
    fn new_queue(&self, name: &str) -> QueueId;

    fn post_task(&self, queue: QueueId, location: &'static Location<'static>, task: Task);

    fn post_delayed_task(
        &self,
        queue: QueueId,
        location: &'static Location<'static>,
        task: Task,
        delay: Duration,
    );

    fn set_queue_enabled(&self, queue: QueueId, enabled: bool);

    fn set_queue_priority(&self, queue: QueueId, priority: QueuePriority);

    fn set_time_domain(&self, queue: QueueId, time_domain: TimeDomainType);

    /// Whether the queue holds a task that is runnable right now.
    fn has_pending_immediate_work(&self, queue: QueueId) -> bool;

    fn add_task_observer(&self, observer: Weak<dyn TaskObserver>);
}

/// Posting handle for one queue.
#[derive(Clone)]
pub struct TaskRunner {
    manager: Arc<dyn TaskQueueManager>,
    queue: QueueId,
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner").field("queue", &self.queue).finish()
    }
}

impl TaskRunner {
    pub fn new(manager: Arc<dyn TaskQueueManager>, queue: QueueId) -> Self {
        Self { manager, queue }
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    #[track_caller]
    pub fn post_task(&self, task: impl FnOnce() + Send + 'static) {
        self.manager
            .post_task(self.queue, Location::caller(), Box::new(task));
    }

    #[track_caller]
    pub fn post_delayed_task(&self, task: impl FnOnce() + Send + 'static, delay: Duration) {
        self.manager
            .post_delayed_task(self.queue, Location::caller(), Box::new(task), delay);
    }

    /// Post with an explicit origin, for wrappers that capture it themselves.
    pub fn post_delayed_task_from(
        &self,
        location: &'static Location<'static>,
        task: impl FnOnce() + Send + 'static,
        delay: Duration,
    ) {
        self.manager
            .post_delayed_task(self.queue, location, Box::new(task), delay);
    }
}
