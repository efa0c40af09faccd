use tracing::trace;

use crate::input::{InputEvent, InputEventResult, InputEventState, InputEventType};

use super::policy::UpdateType;
use super::RendererScheduler;

impl RendererScheduler {
    /// Called by the compositor thread for every input event it handled or
    /// forwarded.
    pub fn did_handle_input_event_on_compositor_thread(&self, event: &InputEvent, state: InputEventState) {
        if self.is_shutdown() || !event.is_prioritized() {
            return;
        }
        self.update_for_input_event_on_compositor_thread(event.event_type, state);
    }

    fn update_for_input_event_on_compositor_thread(&self, event_type: InputEventType, state: InputEventState) {
        let now = self.now();
        let consumed_by_compositor = state == InputEventState::EventConsumedByCompositor;

        let mut any = self.any_thread();
        let mut compositor = self.compositor_thread_only();

        let gesture_already_in_progress = !any.user_model.time_left_in_user_gesture(now).is_zero();
        let was_awaiting_touch_start_response = any.awaiting_touch_start_response;

        any.user_model.did_start_processing_input_event(event_type, now);
        if consumed_by_compositor {
            any.user_model.did_finish_processing_input_event(now);
        }

        match event_type {
            InputEventType::TouchStart => {
                any.awaiting_touch_start_response = true;
                any.last_gesture_was_compositor_driven = false;
                // Assume the page will prevent the default gesture until it
                // shows otherwise.
                any.default_gesture_prevented = true;
            }
            InputEventType::TouchMove => {
                // A second consecutive touchmove means the page is
                // consuming the sequence; the first one keeps the wait.
                if any.awaiting_touch_start_response && compositor.last_input_type == InputEventType::TouchMove {
                    any.awaiting_touch_start_response = false;
                }
            }
            InputEventType::GesturePinchUpdate | InputEventType::GestureScrollUpdate => {
                // The gesture can no longer be cancelled, so lock it to the
                // thread that is handling it.
                any.last_gesture_was_compositor_driven = consumed_by_compositor;
                any.awaiting_touch_start_response = false;
                any.default_gesture_prevented = false;
            }
            InputEventType::GestureFlingCancel => {
                any.fling_compositor_escalation_deadline = None;
            }
            InputEventType::GestureTapDown | InputEventType::GestureShowPress | InputEventType::GestureScrollEnd => {
                // No observable effect; not a touchstart response.
            }
            InputEventType::MouseDown => {
                // New drag.
                any.last_gesture_was_compositor_driven = false;
                any.default_gesture_prevented = true;
            }
            InputEventType::MouseMove => {
                // A drag with the left button held behaves like a touch
                // gesture.
                any.last_gesture_was_compositor_driven = consumed_by_compositor;
                any.awaiting_touch_start_response = false;
            }
            InputEventType::MouseWheel => {
                any.last_gesture_was_compositor_driven = consumed_by_compositor;
                any.awaiting_touch_start_response = false;
                any.default_gesture_prevented = !consumed_by_compositor;
            }
            InputEventType::Undefined => {}
            _ => {
                any.awaiting_touch_start_response = false;
            }
        }

        trace!(?event_type, ?state, "input event on compositor thread");

        // Events of a gesture already under way keep the current policy.
        if !gesture_already_in_progress
            || was_awaiting_touch_start_response != any.awaiting_touch_start_response
        {
            self.ensure_urgent_policy_update_posted();
        }
        compositor.last_input_type = event_type;
    }

    /// Called on the main thread once its handlers have seen `event`.
    pub fn did_handle_input_event_on_main_thread(&self, event: &InputEvent, result: InputEventResult) {
        if self.is_shutdown() || !event.is_prioritized() {
            return;
        }
        let now = self.now();
        let mut any = self.any_thread();
        any.user_model.did_finish_processing_input_event(now);

        // A touchstart whose default the page prevented establishes the
        // gesture right away, which catches single-event gestures such as
        // button presses.
        if any.awaiting_touch_start_response && result == InputEventResult::HandledApplication {
            any.awaiting_touch_start_response = false;
            any.default_gesture_prevented = true;
            self.update_policy_locked(&mut any, UpdateType::MayEarlyOutIfPolicyUnchanged);
        }
    }

    /// The compositor is animating in response to input, typically a fling.
    pub fn did_animate_for_input_on_compositor_thread(&self) {
        if self.is_shutdown() {
            return;
        }
        let now = self.now();
        let limit = self.config.policy.fling_escalation_limit();
        self.any_thread().fling_compositor_escalation_deadline = Some(now + limit);
    }
}
