//! Policy-driven task scheduler for a renderer main thread.
//!
//! The [`RendererScheduler`] multiplexes control, compositor, default,
//! loading and timer queues onto one thread. It classifies what the user is
//! doing into a [`UseCase`], derives a [`Policy`] of per-queue enablement,
//! priority and time domain, and pushes that policy into a
//! [`TaskQueueManager`]. Completed tasks feed the estimators, which in turn
//! shape the next policy.

pub mod deadline_task_runner;
pub mod estimators;
pub mod idle;
pub mod input;
pub mod metrics;
pub mod queue;
pub mod queue_manager;
pub mod renderer;
pub mod user_model;

pub use deadline_task_runner::DeadlineTaskRunner;
pub use estimators::{
    IdleTimeEstimator, QueueingTimeEstimator, QueueingTimeEstimatorClient, TaskCostEstimator,
    ThreadLoadTracker,
};
pub use idle::{IdleHelper, IdleHelperDelegate, IdlePeriodState, IdlePeriodTracker, LongIdleDecision};
pub use input::{InputEvent, InputEventResult, InputEventState, InputEventType};
pub use metrics::SchedulerMetrics;
pub use queue::{
    QueueId, QueuePriority, Task, TaskObserver, TaskQueueManager, TaskRunner, TimeDomainType,
};
pub use queue_manager::SimpleTaskQueueManager;
pub use renderer::{
    BeginFrameArgs, ExpensiveTaskPolicy, NavigatingFrameType, Policy, RailMode, RailModeObserver,
    RendererScheduler, TaskQueuePolicy, UseCase,
};
pub use user_model::UserModel;
