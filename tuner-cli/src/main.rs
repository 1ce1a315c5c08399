//! # Tuner - Instrument Tuner and Metronome
//!
//! Console front end for `tuner-core`.
//!
//! ## Architecture
//! - **Main Thread**: reads commands and owns the audio [`Session`]
//! - **Engine Threads**: the core's tuner or metronome workers
//! - **Printer Thread**: renders notifications arriving over a crossbeam channel

mod console;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::Command;
use session::Session;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tuner_core::{ChannelNotifier, Config, Tempo};

#[derive(Parser, Debug)]
#[command(name = "tuner", version, about = "Instrument tuner and metronome")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Show the detected note until Enter is pressed
    Tune,
    /// Click at a fixed tempo until Enter is pressed
    Metronome {
        /// Beats per minute (40-218)
        #[arg(value_parser = console::parse_tempo)]
        bpm: Option<Tempo>,
    },
    /// Print standard guitar tuning
    Strings,
    /// Switch between tuner and metronome from a prompt (default)
    Interactive,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    tracing::debug!(?config, "configuration loaded");

    let (notify_tx, notify_rx) = crossbeam_channel::unbounded();
    let printer = console::spawn_printer(notify_rx, config.tuner.in_tune_cents);
    let mut session = Session::new(config, Arc::new(ChannelNotifier::new(notify_tx)));

    let result = match cli.mode.unwrap_or(Mode::Interactive) {
        Mode::Tune => run_until_enter(&mut session, |s| Ok(s.start_tuner()?)),
        Mode::Metronome { bpm } => run_until_enter(&mut session, |s| Ok(s.start_metronome(bpm)?)),
        Mode::Strings => {
            println!("{}", console::format_strings());
            Ok(())
        }
        Mode::Interactive => run_interactive(&mut session),
    };

    // Dropping the session releases the device and the last notifier.
    drop(session);
    let _ = printer.join();
    result
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run_until_enter(
    session: &mut Session,
    start: impl FnOnce(&mut Session) -> Result<()>,
) -> Result<()> {
    start(session)?;
    eprintln!("Running ({}). Press Enter to stop.", session.mode());
    let _ = std::io::stdin().read_line(&mut String::new());
    session.stop();
    Ok(())
}

fn run_interactive(session: &mut Session) -> Result<()> {
    eprintln!("{}", console::HELP);
    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match console::parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };

        let outcome = match command {
            Command::Tune => session.start_tuner(),
            Command::Metronome(tempo) => session.start_metronome(tempo),
            Command::SetTempo(tempo) => {
                session.set_tempo(tempo);
                eprintln!("tempo {} bpm", session.tempo().bpm());
                Ok(())
            }
            Command::Stop => {
                session.stop();
                Ok(())
            }
            Command::Strings => {
                println!("{}", console::format_strings());
                Ok(())
            }
            Command::Help => {
                eprintln!("{}", console::HELP);
                Ok(())
            }
            Command::Quit => break,
        };

        // A device failure ends that mode only; the prompt keeps going.
        if let Err(e) = outcome {
            eprintln!("error: {e}");
        }
        eprintln!("[{}]", session.mode());
    }
    session.stop();
    Ok(())
}
