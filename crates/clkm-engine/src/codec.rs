//! Binary `.clkm` macro format
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header   16 bytes   "CLKM" | version u16 | count u32 | 6 reserved zero bytes
//! record   1 byte kind tag | f64 timestamp | kind-specific body
//!   move     x i32 | y i32
//!   click    x i32 | y i32 | button u8 (0 = none) | pressed u8
//!   scroll   x i32 | y i32 | dx i32 | dy i32
//!   key      code u32 | char length u8 | UTF-8 bytes
//! ```
//!
//! Records follow the header back to back with no length prefix; the kind tag
//! alone determines how many bytes a record spans.

use crate::error::CodecError;
use crate::events::{
    is_keyboard_event, is_mouse_event, EventKind, KeyAction, KeyboardEvent, MacroEvent,
    MouseAction, MouseButton, MouseEvent,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MAGIC: [u8; 4] = *b"CLKM";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 16;
pub const EXTENSION: &str = "clkm";

/// Decoded file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub count: u32,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Validate magic and version, then read the event count
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let magic: [u8; 4] = r.array()?;
        if magic != MAGIC {
            return Err(CodecError::Format(magic));
        }
        let version = r.u16()?;
        if version > VERSION {
            return Err(CodecError::UnsupportedVersion { found: version, supported: VERSION });
        }
        let count = r.u32()?;
        // Reserved bytes must exist even though their content is ignored
        r.take(HEADER_LEN - r.pos)?;
        Ok(Self { version, count })
    }
}

/// Reads and writes macro files
pub struct MacroFile;

impl MacroFile {
    /// Encode `events` and replace `path` with the result. The bytes land in a
    /// sibling temp file first, so an existing file survives any failure.
    pub fn save(path: impl AsRef<Path>, events: &[MacroEvent]) -> Result<(), CodecError> {
        let path = path.as_ref();
        let bytes = Self::encode(events)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Err(e) = fs::write(&tmp, &bytes).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), events = events.len(), "saved macro");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Vec<MacroEvent>, CodecError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let events = Self::decode(&data)?;
        tracing::debug!(path = %path.display(), events = events.len(), "loaded macro");
        Ok(events)
    }

    /// Read only the header of a file
    pub fn header(path: impl AsRef<Path>) -> Result<Header, CodecError> {
        let data = fs::read(path)?;
        Header::decode(&data)
    }

    pub fn write_to<W: Write>(w: &mut W, events: &[MacroEvent]) -> Result<(), CodecError> {
        let count = u32::try_from(events.len())
            .map_err(|_| CodecError::corrupt(0, "more events than the header can count"))?;
        w.write_all(&Header { version: VERSION, count }.encode())?;

        let mut record = Vec::with_capacity(32);
        for event in events {
            record.clear();
            encode_event(event, &mut record)?;
            w.write_all(&record)?;
        }
        Ok(())
    }

    pub fn encode(events: &[MacroEvent]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(HEADER_LEN + events.len() * 21);
        Self::write_to(&mut out, events)?;
        Ok(out)
    }

    /// Decode exactly the number of records the header declares. Bytes past
    /// the last record are ignored.
    pub fn decode(data: &[u8]) -> Result<Vec<MacroEvent>, CodecError> {
        let header = Header::decode(data)?;
        let mut r = Reader::new(data);
        r.pos = HEADER_LEN;

        // Records are at least 14 bytes; cap the preallocation by what the input can hold
        let cap = (header.count as usize).min(data.len() / 14);
        let mut events = Vec::with_capacity(cap);
        for _ in 0..header.count {
            events.push(decode_event(&mut r)?);
        }
        Ok(events)
    }
}

fn encode_event(event: &MacroEvent, out: &mut Vec<u8>) -> Result<(), CodecError> {
    out.push(event.kind().tag());
    out.extend_from_slice(&event.timestamp().to_le_bytes());

    if is_mouse_event(event) {
        if let Some(m) = event.as_mouse() {
            encode_mouse(m, out);
        }
    } else if is_keyboard_event(event) {
        if let Some(k) = event.as_keyboard() {
            encode_key(k, out)?;
        }
    }
    Ok(())
}

fn encode_mouse(m: &MouseEvent, out: &mut Vec<u8>) {
    out.extend_from_slice(&m.x.to_le_bytes());
    out.extend_from_slice(&m.y.to_le_bytes());
    match m.action {
        MouseAction::Move => {}
        MouseAction::Click { button, pressed } => {
            out.push(button.map(MouseButton::code).unwrap_or(0));
            out.push(pressed as u8);
        }
        MouseAction::Scroll { dx, dy } => {
            out.extend_from_slice(&dx.to_le_bytes());
            out.extend_from_slice(&dy.to_le_bytes());
        }
    }
}

fn encode_key(k: &KeyboardEvent, out: &mut Vec<u8>) -> Result<(), CodecError> {
    out.extend_from_slice(&k.key_code.to_le_bytes());
    let chars = k.key_char.as_deref().unwrap_or("").as_bytes();
    let len = u8::try_from(chars.len()).map_err(|_| CodecError::KeyCharTooLong(chars.len()))?;
    out.push(len);
    out.extend_from_slice(chars);
    Ok(())
}

fn decode_event(r: &mut Reader<'_>) -> Result<MacroEvent, CodecError> {
    let start = r.pos;
    let tag = r.u8()?;
    let kind = EventKind::from_tag(tag)
        .ok_or_else(|| CodecError::corrupt(start, format!("unknown event kind 0x{:02x}", tag)))?;
    let timestamp = r.f64()?;

    if kind.is_mouse() {
        let x = r.i32()?;
        let y = r.i32()?;
        let action = match kind {
            EventKind::MouseClick => {
                let at = r.pos;
                let code = r.u8()?;
                let button = match code {
                    0 => None,
                    c => Some(MouseButton::from_code(c).ok_or_else(|| {
                        CodecError::corrupt(at, format!("unknown mouse button {}", c))
                    })?),
                };
                let pressed = r.u8()? == 1;
                MouseAction::Click { button, pressed }
            }
            EventKind::MouseScroll => {
                let dx = r.i32()?;
                let dy = r.i32()?;
                MouseAction::Scroll { dx, dy }
            }
            _ => MouseAction::Move,
        };
        return Ok(MacroEvent::Mouse(MouseEvent { timestamp, x, y, action }));
    }

    let key_code = r.u32()?;
    let len = r.u8()? as usize;
    let at = r.pos;
    let key_char = if len > 0 {
        let bytes = r.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| CodecError::corrupt(at, "key char is not valid UTF-8"))?;
        Some(s.to_string())
    } else {
        None
    };
    let action = if kind == EventKind::KeyPress { KeyAction::Press } else { KeyAction::Release };

    Ok(MacroEvent::Keyboard(KeyboardEvent { timestamp, action, key_code, key_char }))
}

/// Bounds-checked little-endian cursor
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                CodecError::corrupt(
                    self.pos,
                    format!("truncated: need {} bytes, {} left", n, self.data.len().saturating_sub(self.pos)),
                )
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.array().map(i32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        self.array().map(f64::from_le_bytes)
    }
}
