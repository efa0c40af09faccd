//! Statistical estimators feeding the scheduling policy.
//!
//! - `task_cost`: rolling percentile of top-level task duration per queue class
//! - `idle_time`: per-frame compositor work and the idle time it leaves
//! - `thread_load`: periodic busy-fraction samples with pause/resume
//! - `queueing_time`: expected queueing delay per fixed window

mod idle_time;
mod queueing_time;
mod task_cost;
mod thread_load;

pub use idle_time::IdleTimeEstimator;
pub use queueing_time::{QueueingTimeEstimator, QueueingTimeEstimatorClient};
pub use task_cost::TaskCostEstimator;
pub use thread_load::{LoadReporter, ThreadLoadTracker};
