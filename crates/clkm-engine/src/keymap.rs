//! Raw hook key codes and the logical keys playback can inject
//!
//! Codes are the hook's scan-code based values (extended keys carry the
//! 0x0E00 / 0xE000 prefixes).

use serde::{Deserialize, Serialize};

/// Common raw key codes
pub mod codes {
    pub const ESCAPE: u32 = 1;
    pub const BACKSPACE: u32 = 14;
    pub const TAB: u32 = 15;
    pub const ENTER: u32 = 28;
    pub const LEFT_CONTROL: u32 = 29;
    pub const LEFT_SHIFT: u32 = 42;
    pub const RIGHT_SHIFT: u32 = 54;
    pub const LEFT_ALT: u32 = 56;
    pub const SPACE: u32 = 57;
    pub const F1: u32 = 59;
    pub const F8: u32 = 66;
    pub const F9: u32 = 67;
    pub const F10: u32 = 68;
    pub const F11: u32 = 87;
    pub const F12: u32 = 88;
    pub const RIGHT_CONTROL: u32 = 3613;
    pub const RIGHT_ALT: u32 = 3640;
    pub const HOME: u32 = 3655;
    pub const PAGE_UP: u32 = 3657;
    pub const END: u32 = 3663;
    pub const PAGE_DOWN: u32 = 3665;
    pub const INSERT: u32 = 3666;
    pub const DELETE: u32 = 3667;
    pub const LEFT_SUPER: u32 = 3675;
    pub const RIGHT_SUPER: u32 = 3676;
    pub const UP: u32 = 57416;
    pub const LEFT: u32 = 57419;
    pub const RIGHT: u32 = 57421;
    pub const DOWN: u32 = 57424;
}

/// Logical key understood by input sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Backspace,
    Tab,
    Enter,
    Escape,
    Space,
    PageUp,
    PageDown,
    End,
    Home,
    Left,
    Up,
    Right,
    Down,
    Insert,
    Delete,
    LeftShift,
    RightShift,
    LeftControl,
    RightControl,
    LeftAlt,
    RightAlt,
    LeftSuper,
    RightSuper,
}

/// Resolve a raw hook key code. Codes without a logical equivalent yield `None`.
pub fn lookup(code: u32) -> Option<Key> {
    use Key::*;

    let key = match code {
        codes::BACKSPACE => Backspace,
        codes::TAB => Tab,
        codes::ENTER => Enter,
        codes::LEFT_SHIFT => LeftShift,
        codes::RIGHT_SHIFT => RightShift,
        codes::LEFT_CONTROL => LeftControl,
        codes::RIGHT_CONTROL => RightControl,
        codes::LEFT_ALT => LeftAlt,
        codes::RIGHT_ALT => RightAlt,
        codes::ESCAPE => Escape,
        codes::SPACE => Space,
        codes::PAGE_UP => PageUp,
        codes::PAGE_DOWN => PageDown,
        codes::END => End,
        codes::HOME => Home,
        codes::LEFT => Left,
        codes::UP => Up,
        codes::RIGHT => Right,
        codes::DOWN => Down,
        codes::INSERT => Insert,
        codes::DELETE => Delete,
        // Function keys
        59 => F1, 60 => F2, 61 => F3, 62 => F4, 63 => F5, 64 => F6,
        65 => F7, 66 => F8, 67 => F9, 68 => F10, 87 => F11, 88 => F12,
        // Digit row
        11 => Num0, 2 => Num1, 3 => Num2, 4 => Num3, 5 => Num4,
        6 => Num5, 7 => Num6, 8 => Num7, 9 => Num8, 10 => Num9,
        // Letters
        30 => A, 48 => B, 46 => C, 32 => D, 18 => E, 33 => F, 34 => G,
        35 => H, 23 => I, 36 => J, 37 => K, 38 => L, 50 => M, 49 => N,
        24 => O, 25 => P, 16 => Q, 19 => R, 31 => S, 20 => T, 22 => U,
        47 => V, 17 => W, 45 => X, 21 => Y, 44 => Z,
        codes::LEFT_SUPER => LeftSuper,
        codes::RIGHT_SUPER => RightSuper,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(lookup(30), Some(Key::A));
        assert_eq!(lookup(44), Some(Key::Z));
        assert_eq!(lookup(11), Some(Key::Num0));
        assert_eq!(lookup(codes::F9), Some(Key::F9));
        assert_eq!(lookup(codes::F11), Some(Key::F11));
        assert_eq!(lookup(codes::LEFT), Some(Key::Left));
        assert_eq!(lookup(codes::RIGHT_SUPER), Some(Key::RightSuper));
    }

    #[test]
    fn unknown_codes_have_no_key() {
        assert_eq!(lookup(0), None);
        assert_eq!(lookup(12), None);
        assert_eq!(lookup(99_999), None);
    }
}
