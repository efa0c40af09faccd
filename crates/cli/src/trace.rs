//! Trace format: one JSON object per line.
//!
//! ```text
//! {"at_ms": 0, "event": "navigation_started"}
//! {"at_ms": 40, "event": "input", "type": "touch_start"}
//! {"at_ms": 45, "event": "task", "queue": "timer", "duration_ms": 80}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use cadence_scheduler::{InputEvent, InputEventResult, InputEventType, NavigatingFrameType};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TraceRecord {
    /// Milliseconds since the start of the trace.
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Input {
        #[serde(rename = "type")]
        event_type: InputEventType,
        #[serde(default)]
        left_button_down: bool,
        /// Handled by the compositor without the main thread.
        #[serde(default)]
        consumed: bool,
    },
    MainThreadInput {
        #[serde(rename = "type")]
        event_type: InputEventType,
        #[serde(default)]
        left_button_down: bool,
        #[serde(default)]
        result: InputEventResult,
    },
    BeginFrame {
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        #[serde(default = "default_on_critical_path")]
        on_critical_path: bool,
    },
    CommitFrame,
    BeginFrameNotExpectedSoon,
    AnimateForInput,
    Task {
        queue: TraceQueue,
        #[serde(default)]
        duration_ms: u64,
    },
    NavigationStarted,
    AddPendingNavigation {
        #[serde(default = "default_frame")]
        frame: NavigatingFrameType,
    },
    RemovePendingNavigation {
        #[serde(default = "default_frame")]
        frame: NavigatingFrameType,
    },
    Backgrounded,
    Foregrounded,
    Suspend,
    Resume,
    Hidden,
    Visible,
    TouchHandler {
        present: bool,
    },
}

fn default_interval_ms() -> u64 {
    16
}

fn default_on_critical_path() -> bool {
    true
}

fn default_frame() -> NavigatingFrameType {
    NavigatingFrameType::MainFrame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceQueue {
    Control,
    Default,
    Compositor,
    Loading,
    Timer,
}

/// Build the scheduler's view of an input event from trace fields.
pub fn input_event(event_type: InputEventType, left_button_down: bool) -> InputEvent {
    let event = InputEvent::new(event_type);
    if left_button_down {
        event.with_left_button_down()
    } else {
        event
    }
}

/// Parse a whole trace. Records must be in non-decreasing time order.
pub fn parse_trace(reader: impl BufRead) -> Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    let mut last_at_ms = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read trace line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record: TraceRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid trace record on line {line_no}"))?;
        if record.at_ms < last_at_ms {
            bail!(
                "trace line {line_no} goes back in time ({}ms after {}ms)",
                record.at_ms,
                last_at_ms
            );
        }
        last_at_ms = record.at_ms;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind_with_defaults() {
        let trace = r#"
# warm up
{"at_ms": 0, "event": "navigation_started"}
{"at_ms": 5, "event": "input", "type": "touch_start"}
{"at_ms": 6, "event": "main_thread_input", "type": "touch_start", "result": "handled_application"}
{"at_ms": 10, "event": "begin_frame"}
{"at_ms": 12, "event": "task", "queue": "timer", "duration_ms": 30}
{"at_ms": 20, "event": "add_pending_navigation"}
{"at_ms": 30, "event": "touch_handler", "present": true}
{"at_ms": 30, "event": "hidden"}
"#;
        let records = parse_trace(trace.as_bytes()).unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(records[0].event, TraceEvent::NavigationStarted);
        assert_eq!(
            records[1].event,
            TraceEvent::Input {
                event_type: InputEventType::TouchStart,
                left_button_down: false,
                consumed: false,
            }
        );
        assert_eq!(
            records[2].event,
            TraceEvent::MainThreadInput {
                event_type: InputEventType::TouchStart,
                left_button_down: false,
                result: InputEventResult::HandledApplication,
            }
        );
        assert_eq!(
            records[3].event,
            TraceEvent::BeginFrame {
                interval_ms: 16,
                on_critical_path: true,
            }
        );
        assert_eq!(
            records[4].event,
            TraceEvent::Task {
                queue: TraceQueue::Timer,
                duration_ms: 30,
            }
        );
        assert_eq!(
            records[5].event,
            TraceEvent::AddPendingNavigation {
                frame: NavigatingFrameType::MainFrame,
            }
        );
        assert_eq!(records[6].event, TraceEvent::TouchHandler { present: true });
        assert_eq!(records[7].event, TraceEvent::Hidden);
    }

    #[test]
    fn rejects_unknown_event() {
        let err = parse_trace(r#"{"at_ms": 0, "event": "teleport"}"#.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn rejects_time_going_backwards() {
        let trace = "{\"at_ms\": 10, \"event\": \"hidden\"}\n{\"at_ms\": 5, \"event\": \"visible\"}\n";
        let err = parse_trace(trace.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("goes back in time"));
    }

    #[test]
    fn left_button_makes_drags_prioritized() {
        assert!(input_event(InputEventType::MouseMove, true).is_prioritized());
        assert!(!input_event(InputEventType::MouseMove, false).is_prioritized());
    }
}
