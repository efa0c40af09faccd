use std::fmt;
use std::time::Duration;

use cadence_core::TimeTicks;
use serde::{Deserialize, Serialize};

use crate::queue::{QueuePriority, TimeDomainType};

/// What the user is most likely doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    /// No special activity.
    #[default]
    None,
    /// Gesture driven by the compositor without main thread involvement.
    CompositorGesture,
    /// Gesture whose default action a main thread handler may prevent.
    MainThreadCustomInputHandling,
    /// Compositor gesture the main thread is also producing frames for.
    SynchronizedGesture,
    /// Waiting for the main thread to respond to a touchstart.
    Touchstart,
    /// Initial page load.
    Loading,
    /// Gesture scrolled or zoomed by the main thread.
    MainThreadGesture,
}

impl UseCase {
    pub fn as_str(self) -> &'static str {
        match self {
            UseCase::None => "none",
            UseCase::CompositorGesture => "compositor_gesture",
            UseCase::MainThreadCustomInputHandling => "main_thread_custom_input_handling",
            UseCase::SynchronizedGesture => "synchronized_gesture",
            UseCase::Touchstart => "touchstart",
            UseCase::Loading => "loading",
            UseCase::MainThreadGesture => "main_thread_gesture",
        }
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RAIL performance model phase advertised to interested observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RailMode {
    Response,
    #[default]
    Animation,
    Idle,
    Load,
}

/// What to do with loading and timer tasks that are expected to be long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpensiveTaskPolicy {
    #[default]
    Run,
    Block,
    Throttle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskQueuePolicy {
    pub is_enabled: bool,
    pub priority: QueuePriority,
    pub time_domain: TimeDomainType,
}

impl Default for TaskQueuePolicy {
    fn default() -> Self {
        Self {
            is_enabled: true,
            priority: QueuePriority::Normal,
            time_domain: TimeDomainType::Real,
        }
    }
}

/// Per-class queue settings plus the RAIL mode.
///
/// Compared by value: an update producing an equal policy touches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub compositor_queue_policy: TaskQueuePolicy,
    pub loading_queue_policy: TaskQueuePolicy,
    pub timer_queue_policy: TaskQueuePolicy,
    pub default_queue_policy: TaskQueuePolicy,
    pub rail_mode: RailMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigatingFrameType {
    MainFrame,
    ChildFrame,
}

/// Timing of a frame the compositor is about to begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginFrameArgs {
    pub frame_time: TimeTicks,
    pub interval: Duration,
    /// Whether the main thread frame is needed to produce this frame.
    pub on_critical_path: bool,
}

impl BeginFrameArgs {
    pub fn new(frame_time: TimeTicks, interval: Duration) -> Self {
        Self {
            frame_time,
            interval,
            on_critical_path: true,
        }
    }

    pub fn off_critical_path(mut self) -> Self {
        self.on_critical_path = false;
        self
    }
}

pub trait RailModeObserver: Send + Sync {
    fn on_rail_mode_changed(&self, rail_mode: RailMode);
}
