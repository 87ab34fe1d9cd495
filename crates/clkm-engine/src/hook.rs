//! Input hook adapter
//!
//! Owns the single OS-level hook session and fans every raw notification out
//! to any number of subscribers (recorder, hotkey listener, ...), so no two
//! components ever register with the OS hook independently.
//!
//! Lifecycle: construct once at startup, subscribe, `start()`, and `stop()`
//! before the process exits. Subscribing after `start()` is also safe, even
//! from inside a running callback: dispatch works on a snapshot of the
//! subscriber lists, so a late subscriber begins receiving with the next
//! notification.

use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Key notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub keycode: u32,
}

/// Pointer notification payload. `button` is only meaningful for down/up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseInput {
    pub x: i32,
    pub y: i32,
    pub button: u16,
}

/// Wheel notification payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelInput {
    pub x: i32,
    pub y: i32,
    /// 3 means horizontal; anything else is vertical
    pub direction: u8,
    pub rotation: i32,
}

impl WheelInput {
    pub const HORIZONTAL: u8 = 3;
    pub const VERTICAL: u8 = 4;
}

/// A raw notification from the hook source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    KeyDown(KeyInput),
    KeyUp(KeyInput),
    MouseMove(MouseInput),
    MouseDown(MouseInput),
    MouseUp(MouseInput),
    Wheel(WheelInput),
}

type KeyCallback = Arc<dyn Fn(&KeyInput) + Send + Sync>;
type MouseCallback = Arc<dyn Fn(&MouseInput) + Send + Sync>;
type WheelCallback = Arc<dyn Fn(&WheelInput) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    key_down: Vec<KeyCallback>,
    key_up: Vec<KeyCallback>,
    mouse_move: Vec<MouseCallback>,
    mouse_down: Vec<MouseCallback>,
    mouse_up: Vec<MouseCallback>,
    wheel: Vec<WheelCallback>,
}

/// Handle a hook source uses to deliver notifications.
/// Every current subscriber of the category runs, in registration order. The
/// list is snapshotted first and no lock is held while callbacks run.
#[derive(Clone)]
pub struct Dispatcher {
    subscribers: Arc<RwLock<Subscribers>>,
}

impl Dispatcher {
    pub fn dispatch(&self, input: &RawInput) {
        match input {
            RawInput::KeyDown(e) => run(self.snapshot(|s| &s.key_down), e),
            RawInput::KeyUp(e) => run(self.snapshot(|s| &s.key_up), e),
            RawInput::MouseMove(e) => run(self.snapshot(|s| &s.mouse_move), e),
            RawInput::MouseDown(e) => run(self.snapshot(|s| &s.mouse_down), e),
            RawInput::MouseUp(e) => run(self.snapshot(|s| &s.mouse_up), e),
            RawInput::Wheel(e) => run(self.snapshot(|s| &s.wheel), e),
        }
    }

    fn snapshot<C: Clone>(&self, list: impl FnOnce(&Subscribers) -> &Vec<C>) -> Vec<C> {
        list(&self.subscribers.read()).clone()
    }
}

fn run<T: ?Sized>(callbacks: Vec<Arc<dyn Fn(&T) + Send + Sync>>, input: &T) {
    for cb in callbacks {
        cb(input);
    }
}

/// Platform facility that reports input system-wide
pub trait HookSource: Send + Sync {
    /// Begin delivering notifications to `dispatcher`
    fn activate(&self, dispatcher: Dispatcher) -> anyhow::Result<()>;
    /// Stop delivering notifications
    fn deactivate(&self);
}

pub struct HookAdapter {
    source: Box<dyn HookSource>,
    subscribers: Arc<RwLock<Subscribers>>,
    started: AtomicBool,
}

impl HookAdapter {
    pub fn new(source: impl HookSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            subscribers: Arc::new(RwLock::new(Subscribers::default())),
            started: AtomicBool::new(false),
        }
    }

    /// Activate the hook source. No-op when already started.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let dispatcher = Dispatcher { subscribers: self.subscribers.clone() };
        if let Err(e) = self.source.activate(dispatcher) {
            self.started.store(false, Ordering::SeqCst);
            return Err(Error::Hook(format!("{:#}", e)));
        }
        tracing::info!("input hook started");
        Ok(())
    }

    /// Deactivate the hook source. No-op when not started.
    pub fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            self.source.deactivate();
            tracing::info!("input hook stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn on_key_down(&self, cb: impl Fn(&KeyInput) + Send + Sync + 'static) {
        self.subscribers.write().key_down.push(Arc::new(cb));
    }

    pub fn on_key_up(&self, cb: impl Fn(&KeyInput) + Send + Sync + 'static) {
        self.subscribers.write().key_up.push(Arc::new(cb));
    }

    pub fn on_mouse_move(&self, cb: impl Fn(&MouseInput) + Send + Sync + 'static) {
        self.subscribers.write().mouse_move.push(Arc::new(cb));
    }

    pub fn on_mouse_down(&self, cb: impl Fn(&MouseInput) + Send + Sync + 'static) {
        self.subscribers.write().mouse_down.push(Arc::new(cb));
    }

    pub fn on_mouse_up(&self, cb: impl Fn(&MouseInput) + Send + Sync + 'static) {
        self.subscribers.write().mouse_up.push(Arc::new(cb));
    }

    pub fn on_wheel(&self, cb: impl Fn(&WheelInput) + Send + Sync + 'static) {
        self.subscribers.write().wheel.push(Arc::new(cb));
    }
}

impl Drop for HookAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// In-process hook source. Whoever owns the real OS hook (or a test) pushes
/// notifications through [`ManualHook::emit`]; they are delivered only while
/// the adapter has the source active.
#[derive(Clone, Default)]
pub struct ManualHook {
    dispatcher: Arc<Mutex<Option<Dispatcher>>>,
}

impl ManualHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a notification. Returns false when the source is inactive.
    pub fn emit(&self, input: RawInput) -> bool {
        // Clone out of the lock so subscribers may touch the hook themselves
        let dispatcher = self.dispatcher.lock().clone();
        match dispatcher {
            Some(d) => {
                d.dispatch(&input);
                true
            }
            None => false,
        }
    }

    pub fn key_down(&self, keycode: u32) -> bool {
        self.emit(RawInput::KeyDown(KeyInput { keycode }))
    }

    pub fn key_up(&self, keycode: u32) -> bool {
        self.emit(RawInput::KeyUp(KeyInput { keycode }))
    }

    pub fn mouse_move(&self, x: i32, y: i32) -> bool {
        self.emit(RawInput::MouseMove(MouseInput { x, y, button: 0 }))
    }

    pub fn is_active(&self) -> bool {
        self.dispatcher.lock().is_some()
    }
}

impl HookSource for ManualHook {
    fn activate(&self, dispatcher: Dispatcher) -> anyhow::Result<()> {
        *self.dispatcher.lock() = Some(dispatcher);
        Ok(())
    }

    fn deactivate(&self) {
        self.dispatcher.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource {
        activations: Arc<AtomicUsize>,
        deactivations: Arc<AtomicUsize>,
    }

    impl HookSource for CountingSource {
        fn activate(&self, _dispatcher: Dispatcher) -> anyhow::Result<()> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn deactivate(&self) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingSource;

    impl HookSource for FailingSource {
        fn activate(&self, _dispatcher: Dispatcher) -> anyhow::Result<()> {
            anyhow::bail!("permission denied")
        }

        fn deactivate(&self) {}
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let activations = Arc::new(AtomicUsize::new(0));
        let deactivations = Arc::new(AtomicUsize::new(0));
        let adapter = HookAdapter::new(CountingSource {
            activations: activations.clone(),
            deactivations: deactivations.clone(),
        });

        adapter.stop();
        assert_eq!(deactivations.load(Ordering::SeqCst), 0);

        adapter.start().unwrap();
        adapter.start().unwrap();
        assert_eq!(activations.load(Ordering::SeqCst), 1);
        assert!(adapter.is_started());

        adapter.stop();
        adapter.stop();
        assert_eq!(deactivations.load(Ordering::SeqCst), 1);
        assert!(!adapter.is_started());
    }

    #[test]
    fn fans_out_in_registration_order() {
        let hook = ManualHook::new();
        let adapter = HookAdapter::new(hook.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let log = log.clone();
            adapter.on_key_down(move |e| log.lock().push((id, e.keycode)));
        }
        let wheel_log = log.clone();
        adapter.on_wheel(move |e| wheel_log.lock().push((99, e.rotation as u32)));

        assert!(!hook.key_down(5), "inactive source delivers nothing");
        adapter.start().unwrap();
        assert!(hook.key_down(5));
        hook.key_up(5);
        hook.emit(RawInput::Wheel(WheelInput { x: 0, y: 0, direction: 3, rotation: 2 }));

        assert_eq!(*log.lock(), vec![(0, 5), (1, 5), (2, 5), (99, 2)]);
    }

    #[test]
    fn late_subscriber_receives_next_notification() {
        let hook = ManualHook::new();
        let adapter = HookAdapter::new(hook.clone());
        adapter.start().unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        adapter.on_mouse_move(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        hook.mouse_move(1, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_subscribe_during_dispatch() {
        let hook = ManualHook::new();
        let adapter = Arc::new(HookAdapter::new(hook.clone()));
        adapter.start().unwrap();

        let late = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&adapter);
        let counter = late.clone();
        adapter.on_key_down(move |_| {
            if let Some(adapter) = weak.upgrade() {
                let counter = counter.clone();
                adapter.on_key_down(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        assert!(hook.key_down(1));
        assert_eq!(late.load(Ordering::SeqCst), 0, "new subscriber waits for the next notification");
        assert!(hook.key_down(1));
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stopped_adapter_silences_source() {
        let hook = ManualHook::new();
        let adapter = HookAdapter::new(hook.clone());
        adapter.start().unwrap();
        assert!(hook.is_active());
        adapter.stop();
        assert!(!hook.is_active());
        assert!(!hook.mouse_move(0, 0));
    }

    #[test]
    fn failed_activation_can_be_retried() {
        let adapter = HookAdapter::new(FailingSource);
        assert!(matches!(adapter.start(), Err(Error::Hook(_))));
        assert!(!adapter.is_started());
    }
}
