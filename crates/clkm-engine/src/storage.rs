//! Macro store - a directory of `.clkm` files

use crate::codec::{MacroFile, EXTENSION};
use crate::config;
use crate::events::MacroEvent;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct MacroStore {
    dir: PathBuf,
}

impl MacroStore {
    /// Store under `$HOME/.clkm`
    pub fn new() -> Result<Self> {
        Self::with_dir(config::home_dir()?)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Save as `<name>_<timestamp>.clkm` and return the full path
    pub fn save(&self, name: &str, events: &[MacroEvent]) -> Result<PathBuf> {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.{}", sanitize(name), ts, EXTENSION);
        let path = self.dir.join(&filename);
        MacroFile::save(&path, events).with_context(|| format!("Failed to save {}", filename))?;
        Ok(path)
    }

    /// Load a macro by file name, or by any path that exists as given
    pub fn load(&self, filename: &str) -> Result<Vec<MacroEvent>> {
        let path = self.resolve(filename);
        let events =
            MacroFile::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(events)
    }

    /// Store entry for `filename`, unless it already names an existing file
    pub fn resolve(&self, filename: &str) -> PathBuf {
        let direct = PathBuf::from(filename);
        if direct.is_file() {
            direct
        } else {
            self.dir.join(filename)
        }
    }

    /// All stored macros, sorted by name
    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(s) = name.to_str() {
                if s.ends_with(&format!(".{}", EXTENSION)) {
                    files.push(s.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, filename: &str) -> Result<()> {
        let path = self.dir.join(filename);
        fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

/// Write events as JSON lines: a header line, then one event per line
pub fn export_jsonl<W: Write>(events: &[MacroEvent], mut w: W) -> Result<()> {
    let header = serde_json::json!({ "format": "clkm", "events": events.len() });
    serde_json::to_writer(&mut w, &header)?;
    writeln!(w)?;

    for e in events {
        serde_json::to_writer(&mut w, e)?;
        writeln!(w)?;
    }

    w.flush()?;
    Ok(())
}

fn sanitize(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "macro".to_string()
    } else {
        cleaned
    }
}
