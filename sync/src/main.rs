//! Replays a recorded server message log through a sync session and prints
//! what the client would send and render.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use bughouse_sync::{spawn_session, GameSetup, InboundMessage, SessionConfig, SyncController};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bughouse-sync", about = "Bughouse client sync core")]
struct Cli {
    /// Write logs to daily files in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSON-lines log of server messages through a session.
    Replay {
        /// Game setup as JSON.
        #[arg(long)]
        setup: PathBuf,
        /// One server message per line.
        #[arg(long)]
        log: PathBuf,
        /// Session preferences; defaults to the user config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective session preferences.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// One line of replay output.
#[derive(Serialize)]
#[serde(tag = "out", rename_all = "snake_case")]
enum Output<'a, T: Serialize> {
    Send(&'a T),
    Event(&'a T),
    Snapshot(&'a T),
    Pgn { text: &'a str },
}

fn print_json<T: Serialize>(out: &Output<'_, T>) {
    match serde_json::to_string(out) {
        Ok(line) => {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", line);
        }
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Replay { setup, log, config } => replay(&setup, &log, config.as_deref()).await,
        Commands::Config { config } => {
            let config = SessionConfig::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Log to stderr, or to rolling files when a directory is given. The
/// returned guard flushes the file writer and must be kept alive.
fn init_tracing(
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "bughouse-sync");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            use tracing_subscriber::fmt::format::FmtSpan;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

async fn replay(setup: &Path, log: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let setup_text = std::fs::read_to_string(setup)
        .with_context(|| format!("Failed to read setup {}", setup.display()))?;
    let setup: GameSetup = serde_json::from_str(&setup_text).context("Invalid game setup")?;
    let config = SessionConfig::load(config)?;
    tracing::info!(game = %setup.game_id, "Replaying {}", log.display());

    let controller = SyncController::new(setup, config, Instant::now())?;
    let channels = spawn_session(controller);

    let mut outbound = channels.outbound;
    let sender = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            print_json(&Output::Send(&msg));
        }
    });
    let mut events = channels.events;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_json(&Output::Event(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let file = std::fs::File::open(log)
        .with_context(|| format!("Failed to open message log {}", log.display()))?;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read message log")?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: InboundMessage = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(line = idx + 1, "Skipping unparseable message: {}", e);
                continue;
            }
        };
        channels
            .inbound
            .send(msg)
            .await
            .context("Session closed while replaying")?;
    }

    let snapshot = channels.handle.snapshot().await?;
    let pgn = channels.handle.export_pgn().await?;

    // The actor drops both output channels on exit, which ends the printers.
    channels.handle.shutdown().await;
    drop(channels.handle);
    drop(channels.inbound);
    let _ = sender.await;
    let _ = printer.await;

    print_json(&Output::Snapshot(&snapshot));
    print_json::<()>(&Output::Pgn { text: &pgn });
    Ok(())
}
