//! Gesture model built from raw input-event signals.

use std::time::Duration;

use cadence_core::TimeTicks;
use serde::Serialize;
use tracing::trace;

use crate::input::InputEventType;

/// Escalation window granted to input after its last signal.
pub const GESTURE_ESTIMATION_LIMIT: Duration = Duration::from_millis(100);
/// Typical length of a gesture; a gesture younger than this is expected to
/// continue rather than be followed by a new one.
pub const MEDIAN_GESTURE_DURATION: Duration = Duration::from_millis(300);
/// How long after a continuous gesture another one is considered likely.
pub const EXPECT_SUBSEQUENT_GESTURE: Duration = Duration::from_millis(2000);

/// Outcome counters for the gesture predictor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GesturePredictionStats {
    /// Gestures that started while one was expected.
    pub correct: u64,
    /// Gestures that started without being expected.
    pub incorrect: u64,
    pub gesture_durations_recorded: u64,
}

/// Tracks input signals to tell whether a gesture is in progress or likely.
#[derive(Debug, Clone, Default)]
pub struct UserModel {
    pending_input_event_count: usize,
    last_input_signal_time: Option<TimeTicks>,
    last_gesture_start_time: Option<TimeTicks>,
    last_continuous_gesture_time: Option<TimeTicks>,
    last_gesture_expected_start_time: Option<TimeTicks>,
    last_reset_time: Option<TimeTicks>,
    is_gesture_active: bool,
    is_gesture_expected: bool,
    stats: GesturePredictionStats,
}

impl UserModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did_start_processing_input_event(&mut self, event_type: InputEventType, now: TimeTicks) {
        use InputEventType::*;

        self.last_input_signal_time = Some(now);

        if matches!(event_type, TouchStart | GestureScrollBegin | GesturePinchBegin) {
            if !self.is_gesture_active {
                self.last_gesture_start_time = Some(now);
                if self.is_gesture_expected {
                    self.stats.correct += 1;
                } else {
                    self.stats.incorrect += 1;
                }
                trace!(predicted = self.is_gesture_expected, "gesture started");
            }
            self.is_gesture_active = true;
        }

        // Taps are not continuous gestures and must not look like scrolls.
        if matches!(
            event_type,
            GestureScrollBegin
                | GestureScrollEnd
                | GestureScrollUpdate
                | GestureFlingStart
                | GestureFlingCancel
                | GesturePinchBegin
                | GesturePinchEnd
                | GesturePinchUpdate
        ) {
            self.last_continuous_gesture_time = Some(now);
        }

        if matches!(event_type, GestureScrollEnd | GesturePinchEnd | GestureFlingStart | TouchEnd) {
            if self.is_gesture_active {
                if let Some(start) = self.last_gesture_start_time {
                    trace!(duration_ms = (now - start).as_millis() as u64, "gesture ended");
                }
                self.stats.gesture_durations_recorded += 1;
            }
            self.is_gesture_active = false;
        }

        self.pending_input_event_count += 1;
    }

    pub fn did_finish_processing_input_event(&mut self, now: TimeTicks) {
        self.last_input_signal_time = Some(now);
        self.pending_input_event_count = self.pending_input_event_count.saturating_sub(1);
    }

    /// How much longer input should keep its escalated priority.
    pub fn time_left_in_user_gesture(&self, now: TimeTicks) -> Duration {
        if self.pending_input_event_count > 0 {
            return GESTURE_ESTIMATION_LIMIT;
        }
        match self.last_input_signal_time {
            Some(last) if last + GESTURE_ESTIMATION_LIMIT >= now => {
                (last + GESTURE_ESTIMATION_LIMIT) - now
            }
            _ => Duration::ZERO,
        }
    }

    /// Whether a new gesture is likely soon, and for how long that answer
    /// holds. The duration is zero when no expiry applies.
    pub fn is_gesture_expected_soon(&mut self, now: TimeTicks) -> (bool, Duration) {
        let was_gesture_expected = self.is_gesture_expected;
        let (expected, valid_for) = self.is_gesture_expected_soon_impl(now);
        self.is_gesture_expected = expected;

        if !was_gesture_expected && expected {
            self.last_gesture_expected_start_time = Some(now);
        }
        if was_gesture_expected && !expected {
            if let Some(start) = self.last_gesture_expected_start_time {
                if self.last_reset_time.map_or(true, |reset| start > reset) {
                    trace!(duration_ms = (now - start).as_millis() as u64, "gesture expectation ended");
                }
            }
        }
        (expected, valid_for)
    }

    fn is_gesture_expected_soon_impl(&self, now: TimeTicks) -> (bool, Duration) {
        if self.is_gesture_active {
            if let Some(remaining) = self.time_until_gesture_expected_to_end(now) {
                return (false, remaining);
            }
            return (true, EXPECT_SUBSEQUENT_GESTURE);
        }

        match self.last_continuous_gesture_time {
            Some(last) if last + EXPECT_SUBSEQUENT_GESTURE > now => {
                (true, (last + EXPECT_SUBSEQUENT_GESTURE) - now)
            }
            _ => (false, Duration::ZERO),
        }
    }

    fn time_until_gesture_expected_to_end(&self, now: TimeTicks) -> Option<Duration> {
        let expected_end = self.last_gesture_start_time? + MEDIAN_GESTURE_DURATION;
        (expected_end > now).then(|| expected_end - now)
    }

    /// Forget everything, e.g. on navigation.
    pub fn reset(&mut self, now: TimeTicks) {
        let stats = self.stats;
        *self = Self {
            last_reset_time: Some(now),
            stats,
            ..Self::default()
        };
    }

    pub fn is_gesture_active(&self) -> bool {
        self.is_gesture_active
    }

    pub fn pending_input_event_count(&self) -> usize {
        self.pending_input_event_count
    }

    pub fn stats(&self) -> GesturePredictionStats {
        self.stats
    }
}
