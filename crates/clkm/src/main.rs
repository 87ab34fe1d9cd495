//! clkm - input macro CLI
//!
//! Record with global hotkeys, then replay, inspect and manage `.clkm`
//! macro files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clkm_engine::{keymap, platform};
use clkm_engine::prelude::*;
use clkm_engine::storage::export_jsonl;
use clkm_engine::{EventKind, Header, PlayerConfig};

#[derive(Parser)]
#[command(name = "clkm")]
#[command(about = "clkm - record, replay and inspect input macros")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.clkm/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hotkey session: record, replay and stop with global hotkeys, save on exit
    Record {
        /// Name for the saved macro
        #[arg(short, long, default_value = "macro")]
        name: String,
        /// Passes per play hotkey, 0 repeats until stopped (default from config)
        #[arg(short, long)]
        loops: Option<u32>,
        /// Start the session with an existing macro
        #[arg(long)]
        load: Option<String>,
    },
    /// Replay a macro
    Play {
        file: String,
        /// Number of passes (default from config)
        #[arg(short, long, conflicts_with = "infinite")]
        loops: Option<u32>,
        /// Repeat until Ctrl+C
        #[arg(long)]
        infinite: bool,
        /// Seconds to wait before the first pass
        #[arg(long, default_value = "2")]
        delay: f64,
    },
    /// Show macro info
    Show {
        file: String,
        /// List every event
        #[arg(long)]
        all: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export a macro as JSON lines
    Export {
        file: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List stored macros
    List,
    /// Delete a stored macro
    Delete {
        file: String,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the config file if none exists yet
        #[arg(long)]
        init: bool,
    },
}

#[derive(Serialize)]
struct Summary {
    file: String,
    version: u16,
    events: u32,
    duration_secs: f64,
    moves: usize,
    clicks: usize,
    scrolls: usize,
    key_presses: usize,
    key_releases: usize,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("clkm=info,clkm_engine=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(p) => p,
        None => EngineConfig::default_path()?,
    };
    let config = EngineConfig::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), loops = config.loops, "config loaded");

    match cli.command {
        Commands::Record { name, loops, load } => record(&config, &name, loops, load.as_deref()),
        Commands::Play { file, loops, infinite, delay } => {
            let loops = if infinite { 0 } else { loops.unwrap_or(config.loops) };
            play(&config, &file, loops, delay)
        }
        Commands::Show { file, all, json } => show(&config, &file, all, json),
        Commands::Export { file, output } => export(&config, &file, output.as_deref()),
        Commands::List => list(&config),
        Commands::Delete { file } => delete(&config, &file),
        Commands::Config { init } => show_config(&config, &config_path, init),
    }
}

fn store(config: &EngineConfig) -> Result<MacroStore> {
    MacroStore::with_dir(config.store_dir()?)
}

fn record(config: &EngineConfig, name: &str, loops: Option<u32>, load: Option<&str>) -> Result<()> {
    let hooks = platform::default_hook().context("No global input hook on this platform")?;
    let store = store(config)?;
    let controller = MacroController::new(config, Arc::from(platform::default_sink()));
    if let Some(loops) = loops {
        controller.set_loops(loops);
    }
    if let Some(file) = load {
        let count = controller.load(store.resolve(file))?;
        println!("Loaded {} events from {}", count, file);
    }
    let initial = controller.events();

    let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    controller.attach(&hooks)?;
    let keys = controller.hotkeys().bindings().snapshot();
    println!(
        "{} record/stop, {} play, {} stop. Ctrl+C to save and quit.",
        key_name(keys.record),
        key_name(keys.play),
        key_name(keys.stop)
    );

    controller.run_hotkeys(controller.hotkeys().receiver(), &quit_rx);
    controller.detach(&hooks);
    controller.player().join();

    let events = controller.events();
    if events.is_empty() || events == initial {
        println!("\nNothing new recorded.");
        return Ok(());
    }
    let path = store.save(name, &events)?;
    println!("\nSaved {} events to {}", events.len(), path.display());
    Ok(())
}

fn key_name(code: u32) -> String {
    match keymap::lookup(code) {
        Some(key) => format!("{:?}", key),
        None => format!("key {}", code),
    }
}

/// `None` for no delay; huge, negative or NaN values are rejected
fn start_delay(secs: f64) -> Result<Option<Duration>> {
    if secs == 0.0 {
        return Ok(None);
    }
    let wait = Duration::try_from_secs_f64(secs)
        .with_context(|| format!("Invalid delay: {} seconds", secs))?;
    Ok(Some(wait))
}

fn play(config: &EngineConfig, file: &str, loops: u32, delay: f64) -> Result<()> {
    let store = store(config)?;
    let events = store.load(file)?;
    if events.is_empty() {
        println!("Macro is empty, nothing to play.");
        return Ok(());
    }

    let passes = if loops == 0 { "until Ctrl+C".to_string() } else { format!("{} time(s)", loops) };
    println!("Playing {} ({} events) {}", file, events.len(), passes);
    if !platform::injects_input() {
        println!("No input injection on this platform, dry run only.");
    }

    let player = Arc::new(Player::with_config(
        Arc::from(platform::default_sink()),
        PlayerConfig { notify_buffer: config.notify_buffer },
    ));
    let p = player.clone();
    ctrlc::set_handler(move || p.stop()).context("Failed to install Ctrl+C handler")?;

    if let Some(wait) = start_delay(delay)? {
        println!("Starting in {} seconds...", delay);
        std::thread::sleep(wait);
    }

    if !player.play(events, loops) {
        return Ok(());
    }

    let mut dispatched = 0usize;
    loop {
        let note = match player.receiver().recv_timeout(Duration::from_millis(200)) {
            Ok(note) => note,
            // A full queue may have swallowed `Stopped`
            Err(RecvTimeoutError::Timeout) if player.is_playing() => continue,
            Err(_) => break,
        };
        match note {
            PlaybackEvent::Loop { current, total } if total > 0 => {
                print!("\rpass {}/{}", current, total);
                io::stdout().flush()?;
            }
            PlaybackEvent::Loop { current, .. } => {
                print!("\rpass {}", current);
                io::stdout().flush()?;
            }
            PlaybackEvent::Event(_) => dispatched += 1,
            PlaybackEvent::Started => {}
            PlaybackEvent::Stopped => break,
        }
    }
    player.join();

    println!("\nDone! {} passes, {} events dispatched", player.current_loop(), dispatched);
    Ok(())
}

fn summarize(file: &str, header: Header, events: &[MacroEvent]) -> Summary {
    let count = |kind: EventKind| events.iter().filter(|e| e.kind() == kind).count();
    Summary {
        file: file.to_string(),
        version: header.version,
        events: header.count,
        duration_secs: events.last().map(|e| e.timestamp()).unwrap_or(0.0),
        moves: count(EventKind::MouseMove),
        clicks: count(EventKind::MouseClick),
        scrolls: count(EventKind::MouseScroll),
        key_presses: count(EventKind::KeyPress),
        key_releases: count(EventKind::KeyRelease),
    }
}

fn show(config: &EngineConfig, file: &str, all: bool, json: bool) -> Result<()> {
    let store = store(config)?;
    let path = store.resolve(file);
    let header = MacroFile::header(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let events = store.load(file)?;
    let summary = summarize(file, header, &events);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("File: {}", summary.file);
        println!("Version: {}", summary.version);
        println!("Events: {}", summary.events);
        println!("Duration: {:.3}s", summary.duration_secs);
        println!(
            "\nSummary: {} moves, {} clicks, {} scrolls, {} key presses, {} key releases",
            summary.moves, summary.clicks, summary.scrolls, summary.key_presses, summary.key_releases
        );
    }

    if all {
        for (i, e) in events.iter().enumerate() {
            println!("{}: {:?}", i, e);
        }
    }
    Ok(())
}

fn export(config: &EngineConfig, file: &str, output: Option<&Path>) -> Result<()> {
    let events = store(config)?.load(file)?;
    match output {
        Some(path) => {
            let f = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            export_jsonl(&events, BufWriter::new(f))?;
            eprintln!("Exported {} events to {}", events.len(), path.display());
        }
        None => export_jsonl(&events, io::stdout().lock())?,
    }
    Ok(())
}

fn list(config: &EngineConfig) -> Result<()> {
    let store = store(config)?;
    let files = store.list()?;
    if files.is_empty() { println!("No macros saved."); } else { for f in files { println!("{}", f); } }
    Ok(())
}

fn delete(config: &EngineConfig, file: &str) -> Result<()> {
    store(config)?.delete(file)?;
    println!("Deleted: {}", file);
    Ok(())
}

fn show_config(config: &EngineConfig, path: &Path, init: bool) -> Result<()> {
    if init && !path.exists() {
        config.save(path)?;
        eprintln!("Wrote {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
