//! Global hotkey listener
//!
//! Maps three configurable key codes to record/play/stop actions while armed.

use crate::hook::HookAdapter;
use crate::keymap::codes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub const DEFAULT_RECORD_KEY: u32 = codes::F9;
pub const DEFAULT_PLAY_KEY: u32 = codes::F10;
pub const DEFAULT_STOP_KEY: u32 = codes::F11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    Record,
    Play,
    Stop,
}

/// Key codes bound to each action, as plain serializable config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub record: u32,
    pub play: u32,
    pub stop: u32,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            record: DEFAULT_RECORD_KEY,
            play: DEFAULT_PLAY_KEY,
            stop: DEFAULT_STOP_KEY,
        }
    }
}

/// Live bindings shared between the listener and the recorder, which must
/// drop hotkey presses from what it captures. Rebinding is visible to both
/// on the next notification.
#[derive(Debug)]
pub struct HotkeyBindings {
    record: AtomicU32,
    play: AtomicU32,
    stop: AtomicU32,
}

impl HotkeyBindings {
    pub fn new(config: HotkeyConfig) -> Self {
        Self {
            record: AtomicU32::new(config.record),
            play: AtomicU32::new(config.play),
            stop: AtomicU32::new(config.stop),
        }
    }

    fn slot(&self, action: HotkeyAction) -> &AtomicU32 {
        match action {
            HotkeyAction::Record => &self.record,
            HotkeyAction::Play => &self.play,
            HotkeyAction::Stop => &self.stop,
        }
    }

    pub fn get(&self, action: HotkeyAction) -> u32 {
        self.slot(action).load(Ordering::Relaxed)
    }

    pub fn set(&self, action: HotkeyAction, keycode: u32) {
        self.slot(action).store(keycode, Ordering::Relaxed);
    }

    /// Action bound to `keycode`, checked record, then play, then stop
    pub fn action_for(&self, keycode: u32) -> Option<HotkeyAction> {
        [HotkeyAction::Record, HotkeyAction::Play, HotkeyAction::Stop]
            .into_iter()
            .find(|&a| self.get(a) == keycode)
    }

    pub fn is_hotkey(&self, keycode: u32) -> bool {
        self.action_for(keycode).is_some()
    }

    pub fn snapshot(&self) -> HotkeyConfig {
        HotkeyConfig {
            record: self.get(HotkeyAction::Record),
            play: self.get(HotkeyAction::Play),
            stop: self.get(HotkeyAction::Stop),
        }
    }
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self::new(HotkeyConfig::default())
    }
}

pub struct HotkeyListener {
    bindings: Arc<HotkeyBindings>,
    running: AtomicBool,
    initialized: AtomicBool,
    tx: Sender<HotkeyAction>,
    rx: Receiver<HotkeyAction>,
}

impl HotkeyListener {
    pub fn new(bindings: Arc<HotkeyBindings>, buffer: usize) -> Self {
        let (tx, rx) = bounded(buffer.max(1));
        Self {
            bindings,
            running: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            tx,
            rx,
        }
    }

    /// Subscribe to key-down notifications. Only the first call registers.
    pub fn init(self: &Arc<Self>, hooks: &HookAdapter) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        hooks.on_key_down(move |e| {
            this.on_key_down(e.keycode);
        });
    }

    /// Arm the listener
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Disarm the listener
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_hotkey(&self, action: HotkeyAction, keycode: u32) {
        tracing::debug!(?action, keycode, "hotkey rebound");
        self.bindings.set(action, keycode);
    }

    pub fn bindings(&self) -> &Arc<HotkeyBindings> {
        &self.bindings
    }

    /// Triggered actions, in press order
    pub fn receiver(&self) -> &Receiver<HotkeyAction> {
        &self.rx
    }

    /// Feed one key-down. Returns the action it triggered, if any.
    pub fn on_key_down(&self, keycode: u32) -> Option<HotkeyAction> {
        if !self.is_armed() {
            return None;
        }
        let action = self.bindings.action_for(keycode)?;
        tracing::debug!(?action, keycode, "hotkey pressed");
        match self.tx.try_send(action) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::warn!(?action, "hotkey queue full, dropping"),
            Err(TrySendError::Disconnected(_)) => {}
        }
        Some(action)
    }
}
