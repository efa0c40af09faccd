use serde::{Deserialize, Serialize};

/// Input event kinds the scheduler distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEventType {
    Undefined,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseWheel,
    KeyDown,
    KeyUp,
    Char,
    TouchStart,
    TouchMove,
    TouchEnd,
    TouchCancel,
    GestureScrollBegin,
    GestureScrollEnd,
    GestureScrollUpdate,
    GestureFlingStart,
    GestureFlingCancel,
    GestureTapDown,
    GestureShowPress,
    GestureTap,
    GesturePinchBegin,
    GesturePinchEnd,
    GesturePinchUpdate,
}

impl InputEventType {
    pub fn is_mouse(self) -> bool {
        matches!(self, Self::MouseDown | Self::MouseUp | Self::MouseMove | Self::MouseWheel)
    }

    pub fn is_keyboard(self) -> bool {
        matches!(self, Self::KeyDown | Self::KeyUp | Self::Char)
    }
}

/// What the compositor did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEventState {
    EventConsumedByCompositor,
    EventForwardedToMainThread,
}

/// How the main thread's handlers dealt with an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEventResult {
    #[default]
    NotHandled,
    HandledSuppressed,
    /// A page handler consumed the event, e.g. called preventDefault.
    HandledApplication,
    HandledSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(rename = "type")]
    pub event_type: InputEventType,
    #[serde(default)]
    pub left_button_down: bool,
}

impl InputEvent {
    pub fn new(event_type: InputEventType) -> Self {
        Self {
            event_type,
            left_button_down: false,
        }
    }

    pub fn with_left_button_down(mut self) -> Self {
        self.left_button_down = true;
        self
    }

    /// Whether this event goes through the prioritized input path.
    ///
    /// Mouse and keyboard events are not, except mouse wheel (a scroll) and
    /// presses or moves with the left button held (a drag).
    pub fn is_prioritized(&self) -> bool {
        let ty = self.event_type;
        if matches!(ty, InputEventType::MouseDown | InputEventType::MouseMove) && self.left_button_down {
            return true;
        }
        if ty == InputEventType::MouseWheel {
            return true;
        }
        !(ty.is_mouse() || ty.is_keyboard())
    }
}

impl From<InputEventType> for InputEvent {
    fn from(event_type: InputEventType) -> Self {
        Self::new(event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prioritized_events() {
        assert!(InputEvent::new(InputEventType::TouchStart).is_prioritized());
        assert!(InputEvent::new(InputEventType::GestureScrollUpdate).is_prioritized());
        assert!(InputEvent::new(InputEventType::MouseWheel).is_prioritized());
        assert!(InputEvent::new(InputEventType::MouseMove)
            .with_left_button_down()
            .is_prioritized());

        assert!(!InputEvent::new(InputEventType::MouseMove).is_prioritized());
        assert!(InputEvent::new(InputEventType::MouseDown)
            .with_left_button_down()
            .is_prioritized());
        assert!(!InputEvent::new(InputEventType::MouseDown).is_prioritized());
        assert!(!InputEvent::new(InputEventType::KeyDown).is_prioritized());
        assert!(!InputEvent::new(InputEventType::Char).is_prioritized());
    }

    #[test]
    fn event_types_use_snake_case() {
        let event: InputEvent =
            serde_json::from_str(r#"{"type":"gesture_scroll_begin"}"#).unwrap();
        assert_eq!(event, InputEvent::new(InputEventType::GestureScrollBegin));
        assert_eq!(
            serde_json::to_string(&InputEventState::EventConsumedByCompositor).unwrap(),
            "\"event_consumed_by_compositor\""
        );
    }
}
