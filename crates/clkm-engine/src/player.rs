//! Macro playback
//!
//! Replays a captured sequence on a dedicated worker thread, anchoring every
//! pass to a monotonic instant so timing drift never accumulates across
//! events. Cancellation is cooperative: `stop()` raises a flag that the worker
//! checks before and after each inter-event wait, and wakes the wait early.

use crate::events::{
    is_keyboard_event, is_mouse_event, KeyAction, KeyboardEvent, MacroEvent, MouseAction,
    MouseButton, MouseEvent,
};
use crate::inject::{InputSink, ScrollDirection};
use crate::keymap;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Capacity of the notification queue
    pub notify_buffer: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { notify_buffer: 1024 }
    }
}

/// Playback progress notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Started,
    /// A pass is about to run. `total` is 0 for unbounded playback.
    Loop { current: u32, total: u32 },
    /// An event was dispatched
    Event(MacroEvent),
    Stopped,
}

struct Shared {
    sink: Arc<dyn InputSink>,
    playing: AtomicBool,
    stop_requested: AtomicBool,
    current_loop: AtomicU32,
    total_loops: AtomicU32,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    tx: Sender<PlaybackEvent>,
}

impl Shared {
    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn notify(&self, event: PlaybackEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(PlaybackEvent::Event(_))) => {
                tracing::trace!("playback queue full, dropping event notification")
            }
            Err(TrySendError::Full(e)) => tracing::warn!(?e, "playback queue full, dropping"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Sleep until `target` or until a stop request wakes us
    fn wait_until(&self, target: Instant) {
        loop {
            if self.stopping() {
                return;
            }
            let now = Instant::now();
            if now >= target {
                return;
            }
            match self.wake_rx.recv_timeout(target - now) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

/// Marks playback idle and reports it, however the worker exits
struct FinishGuard<'a>(&'a Shared);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.playing.store(false, Ordering::SeqCst);
        tracing::info!(loops = self.0.current_loop.load(Ordering::SeqCst), "playback stopped");
        self.0.notify(PlaybackEvent::Stopped);
    }
}

pub struct Player {
    shared: Arc<Shared>,
    rx: Receiver<PlaybackEvent>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Player {
    pub fn new(sink: Arc<dyn InputSink>) -> Self {
        Self::with_config(sink, PlayerConfig::default())
    }

    pub fn with_config(sink: Arc<dyn InputSink>, config: PlayerConfig) -> Self {
        let (tx, rx) = bounded(config.notify_buffer.max(1));
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                sink,
                playing: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                current_loop: AtomicU32::new(0),
                total_loops: AtomicU32::new(0),
                wake_tx,
                wake_rx,
                tx,
            }),
            rx,
            worker: Mutex::new(None),
        }
    }

    /// Start replaying `events` on the worker thread. `loops == 0` repeats
    /// until stopped. Returns false (and does nothing) when already playing
    /// or when `events` is empty.
    pub fn play(&self, events: Vec<MacroEvent>, loops: u32) -> bool {
        if events.is_empty() {
            return false;
        }
        if self
            .shared
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        // The previous worker has already marked itself idle
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("previous playback thread panicked");
            }
        }

        let shared = &self.shared;
        shared.stop_requested.store(false, Ordering::SeqCst);
        while shared.wake_rx.try_recv().is_ok() {}
        shared.current_loop.store(0, Ordering::SeqCst);
        shared.total_loops.store(loops, Ordering::SeqCst);

        tracing::info!(events = events.len(), loops, "playback started");
        shared.notify(PlaybackEvent::Started);

        let worker_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("clkm-player".into())
            .spawn(move || run(&worker_shared, &events, loops));

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn playback thread");
                let _guard = FinishGuard(shared);
                false
            }
        }
    }

    /// Ask playback to stop. Returns immediately; a [`PlaybackEvent::Stopped`]
    /// notification confirms the worker has finished.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.shared.wake_tx.try_send(());
    }

    /// Block until the current worker (if any) has exited
    pub fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("playback thread panicked");
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    pub fn current_loop(&self) -> u32 {
        self.shared.current_loop.load(Ordering::SeqCst)
    }

    pub fn total_loops(&self) -> u32 {
        self.shared.total_loops.load(Ordering::SeqCst)
    }

    /// Playback notifications
    pub fn receiver(&self) -> &Receiver<PlaybackEvent> {
        &self.rx
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn run(shared: &Shared, events: &[MacroEvent], loops: u32) {
    let _finish = FinishGuard(shared);

    let mut count = 0u32;
    while !shared.stopping() {
        count = count.saturating_add(1);
        shared.current_loop.store(count, Ordering::SeqCst);
        shared.notify(PlaybackEvent::Loop { current: count, total: loops });

        play_once(shared, events);

        if loops > 0 && count >= loops {
            break;
        }
    }
}

fn play_once(shared: &Shared, events: &[MacroEvent]) {
    let anchor = Instant::now();

    for event in events {
        if shared.stopping() {
            return;
        }

        let offset = Duration::try_from_secs_f64(event.timestamp()).unwrap_or(Duration::ZERO);
        shared.wait_until(anchor.checked_add(offset).unwrap_or(anchor));

        if shared.stopping() {
            return;
        }

        if let Err(e) = dispatch(shared.sink.as_ref(), event) {
            tracing::warn!(error = %e, kind = ?event.kind(), "failed to inject event");
        }
        shared.notify(PlaybackEvent::Event(event.clone()));
    }
}

/// Translate one event into sink commands. Key codes without a logical key
/// are skipped silently.
pub fn dispatch(sink: &dyn InputSink, event: &MacroEvent) -> anyhow::Result<()> {
    if is_mouse_event(event) {
        if let Some(m) = event.as_mouse() {
            dispatch_mouse(sink, m)?;
        }
    } else if is_keyboard_event(event) {
        if let Some(k) = event.as_keyboard() {
            dispatch_key(sink, k)?;
        }
    }
    Ok(())
}

fn dispatch_mouse(sink: &dyn InputSink, m: &MouseEvent) -> anyhow::Result<()> {
    sink.move_to(m.x, m.y)?;
    match m.action {
        MouseAction::Move => {}
        MouseAction::Click { button, pressed } => {
            sink.button(button.unwrap_or(MouseButton::Left), pressed)?;
        }
        MouseAction::Scroll { dx, dy } => {
            if dy > 0 {
                sink.scroll(ScrollDirection::Down, dy.unsigned_abs())?;
            } else if dy < 0 {
                sink.scroll(ScrollDirection::Up, dy.unsigned_abs())?;
            }
            if dx > 0 {
                sink.scroll(ScrollDirection::Right, dx.unsigned_abs())?;
            } else if dx < 0 {
                sink.scroll(ScrollDirection::Left, dx.unsigned_abs())?;
            }
        }
    }
    Ok(())
}

fn dispatch_key(sink: &dyn InputSink, k: &KeyboardEvent) -> anyhow::Result<()> {
    let Some(key) = keymap::lookup(k.key_code) else {
        tracing::trace!(code = k.key_code, "no key mapping, skipping");
        return Ok(());
    };
    sink.key(key, k.action == KeyAction::Press)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{RecordingSink, SinkCommand};
    use crate::keymap::Key;

    fn player() -> (Player, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (Player::new(sink.clone()), sink)
    }

    fn drain(player: &Player) -> Vec<PlaybackEvent> {
        player.receiver().try_iter().collect()
    }

    #[test]
    fn empty_sequence_is_a_no_op() {
        let (p, sink) = player();
        assert!(!p.play(Vec::new(), 1));
        p.join();
        assert!(!p.is_playing());
        assert!(drain(&p).is_empty());
        assert!(sink.commands().is_empty());
    }

    #[test]
    fn finite_loops_report_progress_in_order() {
        let (p, sink) = player();
        let events = vec![
            MacroEvent::mouse_move(0.0, 1, 1),
            MacroEvent::mouse_move(0.001, 2, 2),
            MacroEvent::mouse_move(0.002, 3, 3),
        ];
        assert!(p.play(events.clone(), 3));
        p.join();

        let notes = drain(&p);
        let loops: Vec<_> = notes
            .iter()
            .filter_map(|n| match n {
                PlaybackEvent::Loop { current, total } => Some((*current, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(loops, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(notes.first(), Some(&PlaybackEvent::Started));
        assert_eq!(notes.last(), Some(&PlaybackEvent::Stopped));
        assert_eq!(notes.iter().filter(|n| **n == PlaybackEvent::Stopped).count(), 1);

        let dispatched: Vec<_> = notes
            .iter()
            .filter_map(|n| match n {
                PlaybackEvent::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = events.iter().cycle().take(9).cloned().collect();
        assert_eq!(dispatched, expected);

        let moves: Vec<_> = sink.commands();
        assert_eq!(moves.len(), 9);
        assert_eq!(moves[0], SinkCommand::Move(1, 1));
        assert_eq!(moves[5], SinkCommand::Move(3, 3));
        assert!(!p.is_playing());
        assert_eq!(p.current_loop(), 3);
    }

    #[test]
    fn unbounded_playback_stops_on_request() {
        let (p, sink) = player();
        let events = vec![
            MacroEvent::mouse_move(0.0, 1, 1),
            MacroEvent::mouse_move(0.5, 2, 2),
            MacroEvent::mouse_move(1.0, 3, 3),
        ];
        assert!(p.play(events, 0));

        // Wait for the first dispatched event of the first pass
        loop {
            match p.receiver().recv_timeout(Duration::from_secs(5)) {
                Ok(PlaybackEvent::Event(_)) => break,
                Ok(_) => continue,
                Err(e) => panic!("no event dispatched: {:?}", e),
            }
        }
        let asked = Instant::now();
        p.stop();
        p.join();
        assert!(asked.elapsed() < Duration::from_millis(400), "stop should cut the wait short");

        let rest = drain(&p);
        assert_eq!(rest, vec![PlaybackEvent::Stopped]);
        assert_eq!(sink.commands(), vec![SinkCommand::Move(1, 1)]);
        assert_eq!(p.current_loop(), 1);
        assert!(!p.is_playing());
    }

    #[test]
    fn second_play_while_playing_is_ignored() {
        let (p, _sink) = player();
        let events = vec![MacroEvent::mouse_move(0.0, 0, 0), MacroEvent::mouse_move(0.3, 0, 0)];
        assert!(p.play(events.clone(), 1));
        assert!(p.is_playing());
        assert!(!p.play(events, 1));
        p.stop();
        p.join();

        let started = drain(&p).iter().filter(|n| **n == PlaybackEvent::Started).count();
        assert_eq!(started, 1);
    }

    #[test]
    fn player_is_reusable_after_stop() {
        let (p, sink) = player();
        let events = vec![MacroEvent::mouse_move(0.0, 4, 4)];
        assert!(p.play(events.clone(), 1));
        p.join();
        assert!(p.play(events, 2));
        p.join();
        assert_eq!(sink.commands().len(), 3);
    }

    /// Panics on its first command, then behaves
    #[derive(Default)]
    struct FlakySink {
        panicked: AtomicBool,
        moves: AtomicU32,
    }

    impl InputSink for FlakySink {
        fn move_to(&self, _x: i32, _y: i32) -> anyhow::Result<()> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("sink exploded");
            }
            self.moves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn button(&self, _: MouseButton, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn scroll(&self, _: ScrollDirection, _: u32) -> anyhow::Result<()> {
            Ok(())
        }
        fn key(&self, _: Key, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panicked_worker_still_reports_stop_and_allows_replay() {
        let sink = Arc::new(FlakySink::default());
        let p = Player::new(sink.clone());
        let events = vec![MacroEvent::mouse_move(0.0, 1, 1)];

        assert!(p.play(events.clone(), 1));
        let stopped = p
            .receiver()
            .iter()
            .find(|n| *n == PlaybackEvent::Stopped);
        assert!(stopped.is_some());
        assert!(!p.is_playing());

        // Reaps the panicked worker before starting the next one
        assert!(p.play(events, 1));
        p.join();
        assert_eq!(sink.moves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn honours_recorded_timing() {
        let (p, _sink) = player();
        let events = vec![MacroEvent::mouse_move(0.0, 0, 0), MacroEvent::mouse_move(0.08, 1, 1)];
        let started = Instant::now();
        assert!(p.play(events, 1));
        p.join();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn dispatch_maps_clicks_and_scrolls() {
        let sink = RecordingSink::new();
        dispatch(&sink, &MacroEvent::mouse_click(0.0, 5, 6, Some(MouseButton::Right), true)).unwrap();
        dispatch(&sink, &MacroEvent::mouse_click(0.0, 5, 6, None, false)).unwrap();
        dispatch(&sink, &MacroEvent::mouse_scroll(0.0, 1, 2, -2, 3)).unwrap();
        dispatch(&sink, &MacroEvent::mouse_scroll(0.0, 1, 2, 4, -1)).unwrap();

        assert_eq!(
            sink.take(),
            vec![
                SinkCommand::Move(5, 6),
                SinkCommand::Button(MouseButton::Right, true),
                SinkCommand::Move(5, 6),
                SinkCommand::Button(MouseButton::Left, false),
                SinkCommand::Move(1, 2),
                SinkCommand::Scroll(ScrollDirection::Down, 3),
                SinkCommand::Scroll(ScrollDirection::Left, 2),
                SinkCommand::Move(1, 2),
                SinkCommand::Scroll(ScrollDirection::Up, 1),
                SinkCommand::Scroll(ScrollDirection::Right, 4),
            ]
        );
    }

    #[test]
    fn dispatch_maps_keys_and_skips_unknown_codes() {
        let sink = RecordingSink::new();
        dispatch(&sink, &MacroEvent::key_press(0.0, 30)).unwrap();
        dispatch(&sink, &MacroEvent::key_release(0.0, 30)).unwrap();
        dispatch(&sink, &MacroEvent::key_press(0.0, 12_345)).unwrap();
        assert_eq!(
            sink.take(),
            vec![SinkCommand::Key(Key::A, true), SinkCommand::Key(Key::A, false)]
        );
    }

    #[test]
    fn unmapped_keys_still_report_progress() {
        let (p, sink) = player();
        assert!(p.play(vec![MacroEvent::key_press(0.0, 12_345)], 1));
        p.join();
        assert!(sink.commands().is_empty());
        let notes = drain(&p);
        assert!(notes.iter().any(|n| matches!(n, PlaybackEvent::Event(_))));
    }
}
