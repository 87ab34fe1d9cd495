//! Engine errors

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while reading or writing `.clkm` files
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid file format: magic {0:?}")]
    Format([u8; 4]),

    #[error("unsupported version: {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("corrupt data at offset {offset}: {reason}")]
    CorruptData { offset: usize, reason: String },

    #[error("key char is {0} bytes, at most 255 fit in a record")]
    KeyCharTooLong(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CodecError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::CorruptData { offset, reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("input hook failed: {0}")]
    Hook(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Codec(CodecError::Io(e))
    }
}
