//! Session controller
//!
//! Glues the recorder, player and hotkey listener into the record / play /
//! stop workflow a front end drives, and holds the current macro.

use crate::codec::MacroFile;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::MacroEvent;
use crate::hook::HookAdapter;
use crate::hotkeys::{HotkeyAction, HotkeyBindings, HotkeyListener};
use crate::inject::InputSink;
use crate::player::{Player, PlayerConfig};
use crate::recorder::{Recorder, RecorderConfig};
use crate::clock::MonotonicClock;
use crossbeam_channel::{select, Receiver};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// What a controller action ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RecordingStarted,
    RecordingStopped { events: usize },
    PlaybackStarted,
    PlaybackStopRequested,
    /// Nothing to do in the current state
    Ignored,
}

pub struct MacroController {
    recorder: Arc<Recorder>,
    player: Player,
    hotkeys: Arc<HotkeyListener>,
    events: Mutex<Vec<MacroEvent>>,
    loops: AtomicU32,
}

impl MacroController {
    pub fn new(config: &EngineConfig, sink: Arc<dyn InputSink>) -> Self {
        let bindings = Arc::new(HotkeyBindings::new(config.hotkeys));
        let recorder = Recorder::with_clock(
            bindings.clone(),
            Arc::new(MonotonicClock::new()),
            RecorderConfig { notify_buffer: config.notify_buffer },
        );
        let player = Player::with_config(sink, PlayerConfig { notify_buffer: config.notify_buffer });

        Self {
            recorder: Arc::new(recorder),
            player,
            hotkeys: Arc::new(HotkeyListener::new(bindings, config.notify_buffer)),
            events: Mutex::new(Vec::new()),
            loops: AtomicU32::new(config.loops),
        }
    }

    /// Subscribe recorder and hotkeys to the hook, then start both.
    /// Subscriptions happen before the hook starts delivering.
    pub fn attach(&self, hooks: &HookAdapter) -> Result<()> {
        self.recorder.init(hooks);
        self.hotkeys.init(hooks);
        hooks.start()?;
        self.hotkeys.start();
        Ok(())
    }

    /// Disarm hotkeys, stop everything and release the hook
    pub fn detach(&self, hooks: &HookAdapter) {
        self.hotkeys.stop();
        self.stop_all();
        hooks.stop();
    }

    pub fn toggle_record(&self) -> Outcome {
        if self.recorder.is_recording() {
            return self.finish_recording();
        }
        if self.player.is_playing() {
            return Outcome::Ignored;
        }
        self.recorder.start();
        Outcome::RecordingStarted
    }

    /// Play the current macro `loops` times (0 = until stopped)
    pub fn toggle_play(&self, loops: u32) -> Outcome {
        if self.player.is_playing() || self.recorder.is_recording() {
            return Outcome::Ignored;
        }
        let events = self.events.lock().clone();
        if events.is_empty() {
            tracing::info!("no macro to play");
            return Outcome::Ignored;
        }
        if self.player.play(events, loops) {
            Outcome::PlaybackStarted
        } else {
            Outcome::Ignored
        }
    }

    /// Stop recording (keeping what was captured) and request playback stop
    pub fn stop_all(&self) -> Outcome {
        let mut outcome = Outcome::Ignored;
        if self.recorder.is_recording() {
            outcome = self.finish_recording();
        }
        if self.player.is_playing() {
            self.player.stop();
            outcome = Outcome::PlaybackStopRequested;
        }
        outcome
    }

    pub fn handle(&self, action: HotkeyAction) -> Outcome {
        let outcome = match action {
            HotkeyAction::Record => self.toggle_record(),
            HotkeyAction::Play => self.toggle_play(self.loops()),
            HotkeyAction::Stop => self.stop_all(),
        };
        tracing::debug!(?action, ?outcome, "hotkey handled");
        outcome
    }

    /// Handle hotkey actions on the calling thread until `shutdown` fires or
    /// the action channel disconnects
    pub fn run_hotkeys(&self, actions: &Receiver<HotkeyAction>, shutdown: &Receiver<()>) {
        loop {
            select! {
                recv(actions) -> action => match action {
                    Ok(action) => {
                        self.handle(action);
                    }
                    Err(_) => return,
                },
                recv(shutdown) -> _ => return,
            }
        }
    }

    fn finish_recording(&self) -> Outcome {
        let captured = self.recorder.stop();
        let count = captured.len();
        *self.events.lock() = captured;
        Outcome::RecordingStopped { events: count }
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn events(&self) -> Vec<MacroEvent> {
        self.events.lock().clone()
    }

    pub fn set_events(&self, events: Vec<MacroEvent>) {
        *self.events.lock() = events;
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn loops(&self) -> u32 {
        self.loops.load(Ordering::Relaxed)
    }

    pub fn set_loops(&self, loops: u32) {
        self.loops.store(loops, Ordering::Relaxed);
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let events = self.events.lock().clone();
        MacroFile::save(path, &events)?;
        Ok(())
    }

    /// Replace the current macro with the file's contents. On failure the
    /// current macro is left untouched.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let events = MacroFile::load(path)?;
        let count = events.len();
        *self.events.lock() = events;
        Ok(count)
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn hotkeys(&self) -> &Arc<HotkeyListener> {
        &self.hotkeys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, Error};
    use crate::hook::ManualHook;
    use crate::hotkeys::{DEFAULT_PLAY_KEY, DEFAULT_RECORD_KEY, DEFAULT_STOP_KEY};
    use crate::inject::RecordingSink;
    use crate::player::PlaybackEvent;
    use std::time::Duration;

    struct Rig {
        hook: ManualHook,
        adapter: HookAdapter,
        sink: Arc<RecordingSink>,
        controller: MacroController,
    }

    fn rig() -> Rig {
        let hook = ManualHook::new();
        let adapter = HookAdapter::new(hook.clone());
        let sink = Arc::new(RecordingSink::new());
        let controller = MacroController::new(&EngineConfig::default(), sink.clone());
        controller.attach(&adapter).unwrap();
        Rig { hook, adapter, sink, controller }
    }

    fn pump(r: &Rig) {
        let actions: Vec<_> = r.controller.hotkeys().receiver().try_iter().collect();
        for a in actions {
            r.controller.handle(a);
        }
    }

    #[test]
    fn hotkeys_drive_record_and_play() {
        let r = rig();
        r.hook.key_down(DEFAULT_RECORD_KEY);
        pump(&r);
        assert!(r.controller.recorder().is_recording());

        r.hook.mouse_move(10, 20);
        r.hook.key_down(DEFAULT_RECORD_KEY);
        pump(&r);
        assert!(!r.controller.recorder().is_recording());
        assert_eq!(r.controller.event_count(), 1);

        r.hook.key_down(DEFAULT_PLAY_KEY);
        pump(&r);
        r.controller.player().join();
        assert_eq!(r.sink.commands().len(), 1);
    }

    #[test]
    fn stop_hotkey_keeps_the_recording() {
        let r = rig();
        assert_eq!(r.controller.toggle_record(), Outcome::RecordingStarted);
        r.hook.mouse_move(1, 1);
        r.hook.mouse_move(2, 2);
        r.hook.key_down(DEFAULT_STOP_KEY);
        pump(&r);
        assert_eq!(r.controller.event_count(), 2);
        assert!(!r.controller.recorder().is_recording());
    }

    #[test]
    fn play_is_ignored_without_macro_or_while_recording() {
        let r = rig();
        assert_eq!(r.controller.toggle_play(1), Outcome::Ignored);

        r.controller.set_events(vec![MacroEvent::mouse_move(0.0, 0, 0)]);
        r.controller.toggle_record();
        assert_eq!(r.controller.toggle_play(1), Outcome::Ignored);
    }

    #[test]
    fn record_is_ignored_while_playing() {
        let r = rig();
        r.controller.set_events(vec![
            MacroEvent::mouse_move(0.0, 0, 0),
            MacroEvent::mouse_move(0.5, 1, 1),
        ]);
        assert_eq!(r.controller.toggle_play(0), Outcome::PlaybackStarted);
        assert_eq!(r.controller.toggle_record(), Outcome::Ignored);
        assert_eq!(r.controller.stop_all(), Outcome::PlaybackStopRequested);
        r.controller.player().join();

        let stopped = r
            .controller
            .player()
            .receiver()
            .try_iter()
            .filter(|n| *n == PlaybackEvent::Stopped)
            .count();
        assert_eq!(stopped, 1);
    }

    #[test]
    fn save_and_load_round_trip() {
        let r = rig();
        let path = std::env::temp_dir().join(format!("clkm-controller-{}.clkm", std::process::id()));
        let events = vec![MacroEvent::key_press(0.0, 30), MacroEvent::key_release(0.1, 30)];
        r.controller.set_events(events.clone());
        r.controller.save(&path).unwrap();
        r.controller.clear();
        assert_eq!(r.controller.event_count(), 0);
        assert_eq!(r.controller.load(&path).unwrap(), 2);
        std::fs::remove_file(&path).ok();
        assert_eq!(r.controller.events(), events);
    }

    #[test]
    fn failed_load_keeps_current_macro() {
        let r = rig();
        let path = std::env::temp_dir().join(format!("clkm-controller-bad-{}.clkm", std::process::id()));
        std::fs::write(&path, b"NOPE0000000000000000").unwrap();
        r.controller.set_events(vec![MacroEvent::mouse_move(0.0, 0, 0)]);
        let err = r.controller.load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Error::Codec(CodecError::Format(_))));
        assert_eq!(r.controller.event_count(), 1);
    }

    #[test]
    fn run_hotkeys_exits_when_senders_drop() {
        let r = rig();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(HotkeyAction::Record).unwrap();
        tx.send(HotkeyAction::Stop).unwrap();
        drop(tx);
        r.controller.run_hotkeys(&rx, &crossbeam_channel::never());
        assert!(!r.controller.recorder().is_recording());
    }

    #[test]
    fn run_hotkeys_exits_on_shutdown() {
        let r = rig();
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        quit_tx.send(()).unwrap();
        r.controller.run_hotkeys(r.controller.hotkeys().receiver(), &quit_rx);

        r.hook.key_down(DEFAULT_RECORD_KEY);
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        let quitter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            quit_tx.send(()).unwrap();
        });
        r.controller.run_hotkeys(r.controller.hotkeys().receiver(), &quit_rx);
        quitter.join().unwrap();
        assert!(r.controller.recorder().is_recording());
    }

    #[test]
    fn detach_disarms_and_releases_hook() {
        let r = rig();
        r.controller.set_events(vec![
            MacroEvent::mouse_move(0.0, 0, 0),
            MacroEvent::mouse_move(1.0, 1, 1),
        ]);
        r.controller.toggle_play(1);
        r.controller.detach(&r.adapter);
        r.controller.player().join();
        assert!(!r.adapter.is_started());
        assert!(!r.controller.hotkeys().is_armed());
        assert!(!r.hook.key_down(DEFAULT_RECORD_KEY));
        assert!(r.controller.player().receiver().recv_timeout(Duration::from_secs(1)).is_ok());
    }
}
