//! Renderer scheduler policy engine.
//!
//! Split into focused submodules:
//! - `types`: UseCase, Policy and the other value types of the engine
//! - `state`: AnyThread / MainThreadOnly / CompositorThreadOnly partitions
//! - `core`: RendererScheduler struct, constructor, task runners, queries
//! - `policy`: use case classification and policy computation/application
//! - `input`: input signals from the compositor and main threads
//! - `lifecycle`: frame, visibility, backgrounding and navigation signals
//! - `idle`: idle helper delegate

mod core;
mod idle;
mod input;
mod lifecycle;
mod policy;
mod state;
mod types;

pub use self::core::RendererScheduler;
pub use self::types::{
    BeginFrameArgs, ExpensiveTaskPolicy, NavigatingFrameType, Policy, RailMode, RailModeObserver,
    TaskQueuePolicy, UseCase,
};
