//! Macro event model
//!
//! One captured input occurrence per [`MacroEvent`], pointer or key, stamped
//! with seconds elapsed since recording started.

use serde::{Deserialize, Serialize};

/// Wire tag of each event kind. The numeric values are the on-disk tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    MouseMove = 0x01,
    MouseClick = 0x02,
    MouseScroll = 0x03,
    KeyPress = 0x10,
    KeyRelease = 0x11,
}

impl EventKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::MouseMove),
            0x02 => Some(Self::MouseClick),
            0x03 => Some(Self::MouseScroll),
            0x10 => Some(Self::KeyPress),
            0x11 => Some(Self::KeyRelease),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn is_mouse(self) -> bool {
        matches!(self, Self::MouseMove | Self::MouseClick | Self::MouseScroll)
    }

    pub fn is_keyboard(self) -> bool {
        matches!(self, Self::KeyPress | Self::KeyRelease)
    }
}

/// Pointer button. Codes match the file format (0 means "no button").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 1,
    Right = 2,
    Middle = 3,
}

impl MouseButton {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Left),
            2 => Some(Self::Right),
            3 => Some(Self::Middle),
            _ => None,
        }
    }

    /// Raw hook button codes 1/2/3, anything else falls back to left.
    pub fn from_hook(code: u16) -> Self {
        match code {
            2 => Self::Right,
            3 => Self::Middle,
            _ => Self::Left,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// What a pointer event did at its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MouseAction {
    Move,
    Click {
        #[serde(skip_serializing_if = "Option::is_none")]
        button: Option<MouseButton>,
        pressed: bool,
    },
    /// Zero on an axis means no scroll on that axis
    Scroll { dx: i32, dy: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    /// Seconds since recording start
    pub timestamp: f64,
    pub x: i32,
    pub y: i32,
    #[serde(flatten)]
    pub action: MouseAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Press,
    Release,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardEvent {
    /// Seconds since recording start
    pub timestamp: f64,
    pub action: KeyAction,
    /// Raw key code as reported by the input hook
    pub key_code: u32,
    /// Never filled by the recorder; kept so files that carry it survive a round trip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_char: Option<String>,
}

/// A captured input event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum MacroEvent {
    Mouse(MouseEvent),
    Keyboard(KeyboardEvent),
}

impl MacroEvent {
    pub fn mouse_move(timestamp: f64, x: i32, y: i32) -> Self {
        Self::Mouse(MouseEvent { timestamp, x, y, action: MouseAction::Move })
    }

    pub fn mouse_click(
        timestamp: f64,
        x: i32,
        y: i32,
        button: Option<MouseButton>,
        pressed: bool,
    ) -> Self {
        Self::Mouse(MouseEvent {
            timestamp,
            x,
            y,
            action: MouseAction::Click { button, pressed },
        })
    }

    pub fn mouse_scroll(timestamp: f64, x: i32, y: i32, dx: i32, dy: i32) -> Self {
        Self::Mouse(MouseEvent {
            timestamp,
            x,
            y,
            action: MouseAction::Scroll { dx, dy },
        })
    }

    pub fn key_press(timestamp: f64, key_code: u32) -> Self {
        Self::Keyboard(KeyboardEvent {
            timestamp,
            action: KeyAction::Press,
            key_code,
            key_char: None,
        })
    }

    pub fn key_release(timestamp: f64, key_code: u32) -> Self {
        Self::Keyboard(KeyboardEvent {
            timestamp,
            action: KeyAction::Release,
            key_code,
            key_char: None,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Mouse(m) => match m.action {
                MouseAction::Move => EventKind::MouseMove,
                MouseAction::Click { .. } => EventKind::MouseClick,
                MouseAction::Scroll { .. } => EventKind::MouseScroll,
            },
            Self::Keyboard(k) => match k.action {
                KeyAction::Press => EventKind::KeyPress,
                KeyAction::Release => EventKind::KeyRelease,
            },
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Mouse(m) => m.timestamp,
            Self::Keyboard(k) => k.timestamp,
        }
    }

    pub fn is_mouse(&self) -> bool {
        is_mouse_event(self)
    }

    pub fn is_keyboard(&self) -> bool {
        is_keyboard_event(self)
    }

    pub fn as_mouse(&self) -> Option<&MouseEvent> {
        match self {
            Self::Mouse(m) => Some(m),
            Self::Keyboard(_) => None,
        }
    }

    pub fn as_keyboard(&self) -> Option<&KeyboardEvent> {
        match self {
            Self::Keyboard(k) => Some(k),
            Self::Mouse(_) => None,
        }
    }
}

/// True for move, click and scroll events
pub fn is_mouse_event(event: &MacroEvent) -> bool {
    event.kind().is_mouse()
}

/// True for key press and release events
pub fn is_keyboard_event(event: &MacroEvent) -> bool {
    event.kind().is_keyboard()
}
