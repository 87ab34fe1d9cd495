//! Macro recorder
//!
//! Turns raw hook notifications into a timestamped [`MacroEvent`] sequence.
//! Hotkey presses never make it into the recording.

use crate::clock::{Clock, MonotonicClock};
use crate::events::{MacroEvent, MouseButton};
use crate::hook::{HookAdapter, KeyInput, MouseInput, WheelInput};
use crate::hotkeys::HotkeyBindings;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Capacity of the appended-event notification queue
    pub notify_buffer: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { notify_buffer: 1024 }
    }
}

struct Session {
    events: Vec<MacroEvent>,
    started_at: Duration,
    recording: bool,
}

pub struct Recorder {
    session: Mutex<Session>,
    initialized: AtomicBool,
    hotkeys: Arc<HotkeyBindings>,
    clock: Arc<dyn Clock>,
    tx: Sender<MacroEvent>,
    rx: Receiver<MacroEvent>,
}

impl Recorder {
    pub fn new(hotkeys: Arc<HotkeyBindings>) -> Self {
        Self::with_clock(hotkeys, Arc::new(MonotonicClock::new()), RecorderConfig::default())
    }

    pub fn with_clock(
        hotkeys: Arc<HotkeyBindings>,
        clock: Arc<dyn Clock>,
        config: RecorderConfig,
    ) -> Self {
        let (tx, rx) = bounded(config.notify_buffer.max(1));
        Self {
            session: Mutex::new(Session {
                events: Vec::new(),
                started_at: Duration::ZERO,
                recording: false,
            }),
            initialized: AtomicBool::new(false),
            hotkeys,
            clock,
            tx,
            rx,
        }
    }

    /// Subscribe to all six hook categories. Only the first call registers.
    pub fn init(self: &Arc<Self>, hooks: &HookAdapter) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        hooks.on_mouse_move(move |e| this.handle_mouse_move(e));
        let this = Arc::clone(self);
        hooks.on_mouse_down(move |e| this.handle_mouse_button(e, true));
        let this = Arc::clone(self);
        hooks.on_mouse_up(move |e| this.handle_mouse_button(e, false));
        let this = Arc::clone(self);
        hooks.on_wheel(move |e| this.handle_wheel(e));
        let this = Arc::clone(self);
        hooks.on_key_down(move |e| this.handle_key(e, true));
        let this = Arc::clone(self);
        hooks.on_key_up(move |e| this.handle_key(e, false));
    }

    /// Begin a fresh recording. No-op while already recording.
    pub fn start(&self) {
        let mut s = self.session.lock();
        if s.recording {
            return;
        }
        s.events.clear();
        s.started_at = self.clock.now();
        s.recording = true;
        tracing::info!("recording started");
    }

    /// Finish the recording and hand back a copy of it.
    /// Returns an empty sequence when not recording.
    pub fn stop(&self) -> Vec<MacroEvent> {
        let mut s = self.session.lock();
        if !s.recording {
            return Vec::new();
        }
        s.recording = false;
        tracing::info!(events = s.events.len(), "recording stopped");
        s.events.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().recording
    }

    /// Copy of what has been captured so far
    pub fn events(&self) -> Vec<MacroEvent> {
        self.session.lock().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.session.lock().events.len()
    }

    /// Every appended event, for live counters
    pub fn receiver(&self) -> &Receiver<MacroEvent> {
        &self.rx
    }

    pub fn handle_mouse_move(&self, e: &MouseInput) {
        self.append(|t| Some(MacroEvent::mouse_move(t, e.x, e.y)));
    }

    pub fn handle_mouse_button(&self, e: &MouseInput, pressed: bool) {
        let button = MouseButton::from_hook(e.button);
        self.append(|t| Some(MacroEvent::mouse_click(t, e.x, e.y, Some(button), pressed)));
    }

    pub fn handle_wheel(&self, e: &WheelInput) {
        let (dx, dy) = if e.direction == WheelInput::HORIZONTAL {
            (e.rotation, 0)
        } else {
            (0, e.rotation)
        };
        self.append(|t| Some(MacroEvent::mouse_scroll(t, e.x, e.y, dx, dy)));
    }

    pub fn handle_key(&self, e: &KeyInput, pressed: bool) {
        self.append(|t| {
            if self.hotkeys.is_hotkey(e.keycode) {
                return None;
            }
            Some(if pressed {
                MacroEvent::key_press(t, e.keycode)
            } else {
                MacroEvent::key_release(t, e.keycode)
            })
        });
    }

    fn append(&self, build: impl FnOnce(f64) -> Option<MacroEvent>) {
        let event = {
            let mut s = self.session.lock();
            if !s.recording {
                return;
            }
            let elapsed = self.clock.now().saturating_sub(s.started_at);
            let Some(event) = build(elapsed.as_secs_f64()) else {
                return;
            };
            s.events.push(event.clone());
            event
        };

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::trace!("recorder queue full, dropping notification"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::{KeyAction, MouseAction};
    use crate::hook::{ManualHook, RawInput};
    use crate::hotkeys::{HotkeyAction, DEFAULT_STOP_KEY};

    struct Rig {
        hook: ManualHook,
        clock: Arc<ManualClock>,
        recorder: Arc<Recorder>,
        bindings: Arc<HotkeyBindings>,
        _adapter: HookAdapter,
    }

    fn rig() -> Rig {
        let hook = ManualHook::new();
        let adapter = HookAdapter::new(hook.clone());
        let clock = Arc::new(ManualClock::new());
        let bindings = Arc::new(HotkeyBindings::default());
        let recorder = Arc::new(Recorder::with_clock(
            bindings.clone(),
            clock.clone(),
            RecorderConfig::default(),
        ));
        recorder.init(&adapter);
        adapter.start().unwrap();
        Rig { hook, clock, recorder, bindings, _adapter: adapter }
    }

    #[test]
    fn stamps_moves_relative_to_start() {
        let r = rig();
        r.clock.set_secs(10.0);
        r.recorder.start();
        for (t, x) in [(10.0, 1), (10.1, 2), (10.25, 3)] {
            r.clock.set_secs(t);
            r.hook.mouse_move(x, x * 10);
        }
        let events = r.recorder.stop();

        assert_eq!(events.len(), 3);
        let expected = [0.0, 0.1, 0.25];
        for (i, e) in events.iter().enumerate() {
            let m = e.as_mouse().unwrap();
            assert_eq!(m.action, MouseAction::Move);
            assert!((m.timestamp - expected[i]).abs() < 1e-6, "{} vs {}", m.timestamp, expected[i]);
            assert_eq!((m.x, m.y), (i as i32 + 1, (i as i32 + 1) * 10));
        }
        assert!(events.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[test]
    fn ignores_input_while_idle() {
        let r = rig();
        r.hook.mouse_move(1, 1);
        assert_eq!(r.recorder.event_count(), 0);
        assert!(r.recorder.stop().is_empty());
    }

    #[test]
    fn drops_hotkeys() {
        let r = rig();
        r.recorder.start();
        r.hook.key_down(30);
        r.hook.key_down(DEFAULT_STOP_KEY);
        r.hook.key_up(DEFAULT_STOP_KEY);
        r.hook.key_up(30);
        let events = r.recorder.stop();

        let codes: Vec<_> = events.iter().map(|e| e.as_keyboard().unwrap().key_code).collect();
        assert_eq!(codes, vec![30, 30]);
        assert_eq!(events[0].as_keyboard().unwrap().action, KeyAction::Press);
        assert_eq!(events[1].as_keyboard().unwrap().action, KeyAction::Release);
        assert!(events.iter().all(|e| e.as_keyboard().unwrap().key_char.is_none()));
    }

    #[test]
    fn follows_rebound_hotkeys() {
        let r = rig();
        r.bindings.set(HotkeyAction::Stop, 1);
        r.recorder.start();
        r.hook.key_down(1);
        r.hook.key_down(DEFAULT_STOP_KEY);
        let events = r.recorder.stop();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_keyboard().unwrap().key_code, DEFAULT_STOP_KEY);
    }

    #[test]
    fn maps_buttons_and_wheel() {
        let r = rig();
        r.recorder.start();
        r.hook.emit(RawInput::MouseDown(MouseInput { x: 5, y: 6, button: 2 }));
        r.hook.emit(RawInput::MouseUp(MouseInput { x: 5, y: 6, button: 9 }));
        r.hook.emit(RawInput::Wheel(WheelInput { x: 1, y: 2, direction: 3, rotation: -4 }));
        r.hook.emit(RawInput::Wheel(WheelInput { x: 1, y: 2, direction: 4, rotation: 7 }));
        let events = r.recorder.stop();

        let actions: Vec<_> = events.iter().map(|e| e.as_mouse().unwrap().action).collect();
        assert_eq!(
            actions,
            vec![
                MouseAction::Click { button: Some(MouseButton::Right), pressed: true },
                MouseAction::Click { button: Some(MouseButton::Left), pressed: false },
                MouseAction::Scroll { dx: -4, dy: 0 },
                MouseAction::Scroll { dx: 0, dy: 7 },
            ]
        );
    }

    #[test]
    fn restart_discards_previous_session() {
        let r = rig();
        r.recorder.start();
        r.hook.mouse_move(1, 1);
        r.recorder.start();
        assert_eq!(r.recorder.event_count(), 1, "start while recording is a no-op");
        r.recorder.stop();
        assert_eq!(r.recorder.stop(), Vec::new(), "second stop is a no-op");

        r.recorder.start();
        assert_eq!(r.recorder.event_count(), 0);
    }

    #[test]
    fn stop_returns_independent_snapshot() {
        let r = rig();
        r.recorder.start();
        r.hook.mouse_move(1, 1);
        let mut snapshot = r.recorder.stop();
        snapshot.clear();
        assert_eq!(r.recorder.events().len(), 1);
    }

    #[test]
    fn notifies_each_append() {
        let r = rig();
        r.recorder.start();
        r.hook.mouse_move(1, 1);
        r.hook.key_down(DEFAULT_STOP_KEY);
        r.hook.key_down(2);
        r.recorder.stop();
        let seen: Vec<_> = r.recorder.receiver().try_iter().collect();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_mouse());
        assert!(seen[1].is_keyboard());
    }

    #[test]
    fn init_is_idempotent() {
        let hook = ManualHook::new();
        let adapter = HookAdapter::new(hook.clone());
        let recorder = Arc::new(Recorder::new(Arc::new(HotkeyBindings::default())));
        recorder.init(&adapter);
        recorder.init(&adapter);
        adapter.start().unwrap();
        recorder.start();
        hook.mouse_move(0, 0);
        assert_eq!(recorder.stop().len(), 1);
    }
}
