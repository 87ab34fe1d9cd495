//! clkm-engine - input macro capture and replay
//!
//! Records pointer and key input as a timestamped event sequence, stores it
//! in the compact `.clkm` binary format and replays it with the recorded
//! timing, optionally looping.
//!
//! ## Wiring
//!
//! One [`HookAdapter`] per process owns the OS input hook and fans raw
//! notifications out to the [`Recorder`] and the [`HotkeyListener`]. The
//! [`Player`] pushes recorded events into an [`InputSink`]. The OS hook comes
//! from [`platform::default_hook`] or from the host through [`HookSource`].
//!
//! ## Platform Support
//!
//! - **Windows**: capture via low-level hooks, injection via SendInput
//! - **Others**: no built-in capture, dry-run playback through [`TracingSink`]

pub mod clock;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod hook;
pub mod hotkeys;
pub mod inject;
pub mod keymap;
pub mod platform;
pub mod player;
pub mod recorder;
pub mod storage;

pub use codec::{Header, MacroFile};
pub use config::EngineConfig;
pub use controller::{MacroController, Outcome};
pub use error::{CodecError, Error, Result};
pub use events::*;
pub use hook::{HookAdapter, HookSource, ManualHook, RawInput};
pub use hotkeys::{HotkeyAction, HotkeyBindings, HotkeyConfig, HotkeyListener};
pub use inject::{InputSink, RecordingSink, ScrollDirection, TracingSink};
pub use keymap::Key;
pub use player::{PlaybackEvent, Player, PlayerConfig};
pub use recorder::{Recorder, RecorderConfig};
pub use storage::MacroStore;

pub mod prelude {
    pub use crate::codec::MacroFile;
    pub use crate::config::EngineConfig;
    pub use crate::controller::MacroController;
    pub use crate::error::{CodecError, Error, Result};
    pub use crate::events::*;
    pub use crate::hook::{HookAdapter, HookSource, ManualHook, RawInput};
    pub use crate::hotkeys::{HotkeyAction, HotkeyBindings, HotkeyListener};
    pub use crate::inject::InputSink;
    pub use crate::player::{PlaybackEvent, Player};
    pub use crate::recorder::Recorder;
    pub use crate::storage::MacroStore;
}
