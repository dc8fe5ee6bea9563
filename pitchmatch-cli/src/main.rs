//! # Pitchmatch - Terminal Pitch Trainer
//!
//! Terminal front end for the pitch-matching trainer. It starts a session,
//! reads commands from stdin and prints the session state whenever it
//! changes.
//!
//! ## Architecture
//! - **Main Thread**: command handling and rendering
//! - **Input Thread**: reads stdin lines and forwards them as messages
//! - **Session Thread**: owned by the core trainer, ticks at ~60 Hz
//! - **Communication**: Crossbeam channels for commands and snapshots

mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use pitchmatch_core::audio::CpalInput;
use pitchmatch_core::playback::{SilentPlayer, SinePlayer, TonePlayer};
use pitchmatch_core::{PitchTrainer, SessionError, Snapshot, TrainerConfig, notes};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Sing the note you hear and hold it.
#[derive(Debug, Parser)]
#[command(name = "pitchmatch", version, about)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start on this note instead of a random one (e.g. A4)
    #[arg(long)]
    note: Option<String>,

    /// Do not play reference tones
    #[arg(long)]
    no_tone: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Commands typed by the user.
#[derive(Debug, Clone, PartialEq)]
enum Message {
    Start,
    Stop,
    SelectRandom,
    SelectNote(String),
    ListNotes,
    Help,
    Exit,
    Unknown(String),
}

impl Message {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        let message = match command {
            "s" | "start" => Message::Start,
            "x" | "stop" => Message::Stop,
            "r" | "random" => Message::SelectRandom,
            "n" | "note" => match words.next() {
                Some(name) => Message::SelectNote(name.to_string()),
                None => Message::Unknown(line.to_string()),
            },
            "l" | "list" => Message::ListNotes,
            "h" | "help" | "?" => Message::Help,
            "q" | "quit" | "exit" => Message::Exit,
            _ => Message::Unknown(line.to_string()),
        };
        Some(message)
    }
}

const HELP: &str = "commands: [s]tart, sto[x]/stop, [r]andom, [n]ote <NAME>, [l]ist, [h]elp, [q]uit";

/// Main entry point for the terminal trainer.
fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => TrainerConfig::from_file(path)?,
        None => TrainerConfig::default(),
    };
    if args.note.is_some() {
        config.select_on_start = false;
    }
    if args.no_tone {
        config.play_reference_tone = false;
    }

    let player: Arc<dyn TonePlayer> = if config.play_reference_tone {
        Arc::new(SinePlayer {
            duration: config.tone_duration(),
        })
    } else {
        Arc::new(SilentPlayer)
    };
    let mut app = App::new(PitchTrainer::new(Arc::new(CpalInput), player, config));

    println!("{}", HELP);
    app.update(Message::Start);
    if let Some(name) = &args.note {
        app.update(Message::SelectNote(name.clone()));
    }

    let commands = spawn_input_thread().context("starting input thread")?;
    app.run(commands);
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Reads stdin on its own thread so rendering never waits on the user.
fn spawn_input_thread() -> io::Result<Receiver<Message>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("pitchmatch-input".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if let Some(message) = Message::parse(&line) {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
            }
            let _ = tx.send(Message::Exit);
        })?;
    Ok(rx)
}

struct App {
    trainer: PitchTrainer,
    snapshots: Receiver<Snapshot>,
    last_line: Option<String>,
}

impl App {
    fn new(trainer: PitchTrainer) -> Self {
        let snapshots = trainer.subscribe();
        Self {
            trainer,
            snapshots,
            last_line: None,
        }
    }

    fn run(&mut self, commands: Receiver<Message>) {
        let snapshots = self.snapshots.clone();
        loop {
            select! {
                recv(commands) -> message => match message {
                    Ok(Message::Exit) | Err(_) => break,
                    Ok(message) => self.update(message),
                },
                recv(snapshots) -> snapshot => {
                    if let Ok(snapshot) = snapshot {
                        self.render(&snapshot);
                    }
                },
            }
        }
        self.update(Message::Exit);
    }

    /// Applies one command to the trainer.
    fn update(&mut self, message: Message) {
        tracing::debug!("[UPDATE] Received message: {:?}", message);

        let result = match message {
            Message::Start => self.trainer.start(),
            Message::Stop => {
                self.trainer.stop();
                println!("\nstopped");
                Ok(())
            }
            Message::SelectRandom => self.trainer.select_random().map(|_| ()),
            Message::SelectNote(name) => self.trainer.select_note(&name).map(|_| ()),
            Message::ListNotes => {
                let names: Vec<&str> = notes::catalog().iter().map(|n| n.name.as_str()).collect();
                println!("\nnotes: {}", names.join(" "));
                Ok(())
            }
            Message::Help => {
                println!("\n{}", HELP);
                Ok(())
            }
            Message::Exit => {
                self.trainer.stop();
                Ok(())
            }
            Message::Unknown(line) => {
                println!("\nunknown command: {}", line);
                Ok(())
            }
        };

        if let Err(err) = result {
            report(&err);
        }
    }

    /// Redraws the status line when it changed since the last snapshot.
    fn render(&mut self, snapshot: &Snapshot) {
        let line = ui::status_line::render(snapshot, self.trainer.config().tolerance_hz);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return;
        }
        print!("\r\x1b[2K{}", line);
        if snapshot.capture_error.is_some() {
            println!("\ntype `start` to try again");
        }
        let _ = io::stdout().flush();
        self.last_line = Some(line);
    }
}

fn report(err: &SessionError) {
    match err {
        SessionError::Capture(_) => println!("\n{} (fix access and type `start` to retry)", err),
        _ => println!("\n{}", err),
    }
}
