//! Input injection capability consumed by the player

use crate::events::MouseButton;
use crate::keymap::Key;
use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Something that can synthesize pointer and key input
pub trait InputSink: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> Result<()>;
    fn button(&self, button: MouseButton, pressed: bool) -> Result<()>;
    /// `amount` is in wheel notches
    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()>;
    fn key(&self, key: Key, pressed: bool) -> Result<()>;
}

/// Dry-run sink: logs every command instead of injecting it
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl InputSink for TracingSink {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        tracing::info!(x, y, "move");
        Ok(())
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<()> {
        tracing::info!(?button, pressed, "button");
        Ok(())
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()> {
        tracing::info!(?direction, amount, "scroll");
        Ok(())
    }

    fn key(&self, key: Key, pressed: bool) -> Result<()> {
        tracing::info!(?key, pressed, "key");
        Ok(())
    }
}

/// A command as it reached a [`RecordingSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCommand {
    Move(i32, i32),
    Button(MouseButton, bool),
    Scroll(ScrollDirection, u32),
    Key(Key, bool),
}

/// Sink that remembers what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingSink {
    commands: Mutex<Vec<SinkCommand>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SinkCommand> {
        self.commands.lock().clone()
    }

    pub fn take(&self) -> Vec<SinkCommand> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl InputSink for RecordingSink {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.commands.lock().push(SinkCommand::Move(x, y));
        Ok(())
    }

    fn button(&self, button: MouseButton, pressed: bool) -> Result<()> {
        self.commands.lock().push(SinkCommand::Button(button, pressed));
        Ok(())
    }

    fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()> {
        self.commands.lock().push(SinkCommand::Scroll(direction, amount));
        Ok(())
    }

    fn key(&self, key: Key, pressed: bool) -> Result<()> {
        self.commands.lock().push(SinkCommand::Key(key, pressed));
        Ok(())
    }
}
