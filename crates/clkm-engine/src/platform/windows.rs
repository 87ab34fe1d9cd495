//! Windows input capture and injection
//!
//! Capture runs low-level keyboard and mouse hooks on a dedicated thread with
//! its own message loop. Injection uses SendInput for buttons, wheel and keys,
//! SetCursorPos for pointer moves.

use crate::events::MouseButton;
use crate::hook::{Dispatcher, HookSource, KeyInput, MouseInput, RawInput, WheelInput};
use crate::inject::{InputSink, ScrollDirection};
use crate::keymap::Key;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, MOUSEEVENTF_HWHEEL, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, SetCursorPos,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT,
    LLKHF_EXTENDED, LLKHF_INJECTED, LLMHF_INJECTED, MSG, MSLLHOOKSTRUCT, PM_NOREMOVE,
    WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP,
    WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEHWHEEL, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT,
    WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_USER,
};

const WHEEL_DELTA: i32 = 120;

// Hook procedures carry no context pointer, so the active dispatcher is global
static ACTIVE: Mutex<Option<Dispatcher>> = parking_lot::const_mutex(None);

/// Global capture through `WH_KEYBOARD_LL` / `WH_MOUSE_LL`. Only one can be
/// active per process. Injected input (our own playback) is ignored.
#[derive(Default)]
pub struct LowLevelHook {
    thread: Mutex<Option<(u32, JoinHandle<()>)>>,
}

impl LowLevelHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HookSource for LowLevelHook {
    fn activate(&self, dispatcher: Dispatcher) -> Result<()> {
        {
            let mut active = ACTIVE.lock();
            if active.is_some() {
                anyhow::bail!("another low-level hook is already active");
            }
            *active = Some(dispatcher);
        }

        let (ready_tx, ready_rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name("clkm-hook".into())
            .spawn(move || hook_thread(ready_tx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                ACTIVE.lock().take();
                return Err(e).context("Failed to spawn hook thread");
            }
        };

        match ready_rx.recv() {
            Ok(Ok(tid)) => {
                *self.thread.lock() = Some((tid, handle));
                tracing::debug!(tid, "low-level hooks installed");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                ACTIVE.lock().take();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                ACTIVE.lock().take();
                anyhow::bail!("hook thread exited during startup")
            }
        }
    }

    fn deactivate(&self) {
        if let Some((tid, handle)) = self.thread.lock().take() {
            unsafe {
                if let Err(e) = PostThreadMessageW(tid, WM_QUIT, WPARAM(0), LPARAM(0)) {
                    tracing::warn!(error = %e, "failed to signal hook thread");
                }
            }
            if handle.join().is_err() {
                tracing::warn!("hook thread panicked");
            }
        }
        ACTIVE.lock().take();
    }
}

fn hook_thread(ready: Sender<Result<u32>>) {
    let hooks = match unsafe { install_hooks() } {
        Ok(hooks) => hooks,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    unsafe {
        let mut msg = MSG::default();
        // Force the message queue into existence before anyone posts WM_QUIT
        let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);
        let _ = ready.send(Ok(GetCurrentThreadId()));

        while GetMessageW(&mut msg, HWND::default(), 0, 0).0 > 0 {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        for hook in hooks {
            let _ = UnhookWindowsHookEx(hook);
        }
    }
    tracing::debug!("low-level hooks removed");
}

unsafe fn install_hooks() -> Result<[HHOOK; 2]> {
    let module = GetModuleHandleW(PCWSTR::null()).context("GetModuleHandleW failed")?;
    let hmod = HINSTANCE(module.0);

    let keyboard = SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), hmod, 0)
        .context("Failed to install keyboard hook")?;
    let mouse = match SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), hmod, 0) {
        Ok(hook) => hook,
        Err(e) => {
            let _ = UnhookWindowsHookEx(keyboard);
            return Err(e).context("Failed to install mouse hook");
        }
    };
    Ok([keyboard, mouse])
}

fn deliver(input: RawInput) {
    let dispatcher = ACTIVE.lock().clone();
    if let Some(d) = dispatcher {
        d.dispatch(&input);
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let kb = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
        if kb.flags.0 & LLKHF_INJECTED.0 == 0 {
            let extended = kb.flags.0 & LLKHF_EXTENDED.0 != 0;
            let input = KeyInput { keycode: hook_keycode(kb.scanCode, extended) };
            match wparam.0 as u32 {
                WM_KEYDOWN | WM_SYSKEYDOWN => deliver(RawInput::KeyDown(input)),
                WM_KEYUP | WM_SYSKEYUP => deliver(RawInput::KeyUp(input)),
                _ => {}
            }
        }
    }
    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let ms = &*(lparam.0 as *const MSLLHOOKSTRUCT);
        if ms.flags & LLMHF_INJECTED == 0 {
            let (x, y) = (ms.pt.x, ms.pt.y);
            let at = |button| MouseInput { x, y, button };
            let wheel = |direction, rotation| WheelInput { x, y, direction, rotation };
            let input = match wparam.0 as u32 {
                WM_MOUSEMOVE => Some(RawInput::MouseMove(at(0))),
                WM_LBUTTONDOWN => Some(RawInput::MouseDown(at(1))),
                WM_LBUTTONUP => Some(RawInput::MouseUp(at(1))),
                WM_RBUTTONDOWN => Some(RawInput::MouseDown(at(2))),
                WM_RBUTTONUP => Some(RawInput::MouseUp(at(2))),
                WM_MBUTTONDOWN => Some(RawInput::MouseDown(at(3))),
                WM_MBUTTONUP => Some(RawInput::MouseUp(at(3))),
                // Positive wheel delta is away from the user, which replays as scroll up
                WM_MOUSEWHEEL => {
                    Some(RawInput::Wheel(wheel(WheelInput::VERTICAL, -wheel_notches(ms.mouseData))))
                }
                WM_MOUSEHWHEEL => {
                    Some(RawInput::Wheel(wheel(WheelInput::HORIZONTAL, wheel_notches(ms.mouseData))))
                }
                _ => None,
            };
            if let Some(input) = input {
                deliver(input);
            }
        }
    }
    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}

/// Hook key code for a hardware scan code. Extended keys live at
/// `0x0E00 | scan`, except the arrow cluster at `0xE000 | scan`.
fn hook_keycode(scan: u32, extended: bool) -> u32 {
    match (extended, scan) {
        (false, _) => scan,
        (true, 0x48 | 0x4B | 0x4D | 0x50) => 0xE000 | scan,
        (true, _) => 0x0E00 | scan,
    }
}

/// Signed wheel notches from `MSLLHOOKSTRUCT::mouseData`. Partial notches from
/// high-resolution wheels count as one.
fn wheel_notches(mouse_data: u32) -> i32 {
    let delta = (mouse_data >> 16) as u16 as i16 as i32;
    match delta / WHEEL_DELTA {
        0 => delta.signum(),
        n => n,
    }
}

/// Injects input with the Win32 SendInput API
#[derive(Debug, Default, Clone, Copy)]
pub struct SendInputSink;

impl SendInputSink {
    pub fn new() -> Self {
        Self
    }
}

impl InputSink for SendInputSink {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        unsafe {
            SetCursorPos(x, y).map_err(|e| anyhow::anyhow!("Failed to move cursor: {:?}", e))?;
        }
        Ok(())
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<()> {
        let flags = match (button, pressed) {
            (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
            (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
            (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
            (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
            (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
            (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
        };
        send_inputs(&[make_mouse_input(flags, 0)])
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let notches = i32::try_from(amount).unwrap_or(i32::MAX / WHEEL_DELTA);
        let delta = notches.saturating_mul(WHEEL_DELTA);
        let input = match direction {
            ScrollDirection::Up => make_mouse_input(MOUSEEVENTF_WHEEL, delta),
            ScrollDirection::Down => make_mouse_input(MOUSEEVENTF_WHEEL, -delta),
            ScrollDirection::Right => make_mouse_input(MOUSEEVENTF_HWHEEL, delta),
            ScrollDirection::Left => make_mouse_input(MOUSEEVENTF_HWHEEL, -delta),
        };
        send_inputs(&[input])
    }

    fn key(&self, key: Key, pressed: bool) -> Result<()> {
        send_inputs(&[make_key_input(key, pressed)])
    }
}

// Helper functions

fn make_mouse_input(flags: MOUSE_EVENT_FLAGS, data: i32) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: data as _,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn make_key_input(key: Key, pressed: bool) -> INPUT {
    let mut flags = KEYBD_EVENT_FLAGS(0);
    if !pressed {
        flags |= KEYEVENTF_KEYUP;
    }
    if is_extended(key) {
        flags |= KEYEVENTF_EXTENDEDKEY;
    }

    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk_code(key)),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send_inputs(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };

    if sent as usize != inputs.len() {
        return Err(anyhow::anyhow!("SendInput failed: sent {} of {}", sent, inputs.len()));
    }

    Ok(())
}

fn is_extended(key: Key) -> bool {
    use Key::*;
    matches!(
        key,
        PageUp | PageDown | End | Home | Left | Up | Right | Down | Insert | Delete
            | RightControl | RightAlt | LeftSuper | RightSuper
    )
}

/// Virtual-key code for a logical key
fn vk_code(key: Key) -> u16 {
    use Key::*;

    match key {
        A => 0x41, B => 0x42, C => 0x43, D => 0x44, E => 0x45, F => 0x46, G => 0x47,
        H => 0x48, I => 0x49, J => 0x4A, K => 0x4B, L => 0x4C, M => 0x4D, N => 0x4E,
        O => 0x4F, P => 0x50, Q => 0x51, R => 0x52, S => 0x53, T => 0x54, U => 0x55,
        V => 0x56, W => 0x57, X => 0x58, Y => 0x59, Z => 0x5A,
        Num0 => 0x30, Num1 => 0x31, Num2 => 0x32, Num3 => 0x33, Num4 => 0x34,
        Num5 => 0x35, Num6 => 0x36, Num7 => 0x37, Num8 => 0x38, Num9 => 0x39,
        F1 => 0x70, F2 => 0x71, F3 => 0x72, F4 => 0x73, F5 => 0x74, F6 => 0x75,
        F7 => 0x76, F8 => 0x77, F9 => 0x78, F10 => 0x79, F11 => 0x7A, F12 => 0x7B,
        Backspace => 0x08,
        Tab => 0x09,
        Enter => 0x0D,
        Escape => 0x1B,
        Space => 0x20,
        PageUp => 0x21,
        PageDown => 0x22,
        End => 0x23,
        Home => 0x24,
        Left => 0x25,
        Up => 0x26,
        Right => 0x27,
        Down => 0x28,
        Insert => 0x2D,
        Delete => 0x2E,
        LeftSuper => 0x5B,
        RightSuper => 0x5C,
        LeftShift => 0xA0,
        RightShift => 0xA1,
        LeftControl => 0xA2,
        RightControl => 0xA3,
        LeftAlt => 0xA4,
        RightAlt => 0xA5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{self, codes};

    #[test]
    fn scan_codes_become_hook_key_codes() {
        assert_eq!(hook_keycode(0x43, false), codes::F9);
        assert_eq!(hook_keycode(0x57, false), codes::F11);
        assert_eq!(keymap::lookup(hook_keycode(0x1E, false)), Some(Key::A));
        assert_eq!(keymap::lookup(hook_keycode(0x48, true)), Some(Key::Up));
        assert_eq!(keymap::lookup(hook_keycode(0x4B, true)), Some(Key::Left));
        assert_eq!(keymap::lookup(hook_keycode(0x1D, true)), Some(Key::RightControl));
        assert_eq!(keymap::lookup(hook_keycode(0x53, true)), Some(Key::Delete));
    }

    #[test]
    fn wheel_deltas_become_notches() {
        let data = |delta: i16| (delta as u16 as u32) << 16;
        assert_eq!(wheel_notches(data(120)), 1);
        assert_eq!(wheel_notches(data(-240)), -2);
        assert_eq!(wheel_notches(data(30)), 1);
        assert_eq!(wheel_notches(data(-30)), -1);
        assert_eq!(wheel_notches(0), 0);
    }

    #[test]
    fn every_key_has_a_virtual_key() {
        for code in 0..=0xE100u32 {
            if let Some(key) = keymap::lookup(code) {
                assert_ne!(vk_code(key), 0, "{:?}", key);
            }
        }
    }
}
