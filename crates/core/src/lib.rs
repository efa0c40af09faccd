pub mod clock;
pub mod config;
pub mod error;
pub mod history;

pub use clock::{DefaultTickClock, TestTickClock, TickClock, TimeTicks};
pub use config::SchedulerConfig;
pub use error::*;
pub use history::RollingDurationHistory;
