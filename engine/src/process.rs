//! Analysis engine child process: spawn, banner handshake, reader, writer
//! and command tasks.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{parse_line, AnalysisLine};
use crate::{EngineCommand, EngineError, EngineEvent, LineDirection};

const BANNER_TIMEOUT: Duration = Duration::from_secs(10);

/// How to launch the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Explicit executable; searched in common locations when `None`.
    pub path: Option<PathBuf>,
    pub hash_mb: Option<u32>,
    /// Variant definitions fed to the engine after its banner.
    pub variants_ini: Option<String>,
}

pub struct AnalysisEngine {
    process: Child,
    command_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    banner: Option<String>,
}

impl AnalysisEngine {
    #[tracing::instrument(level = "info", skip(options))]
    pub async fn spawn(options: EngineOptions) -> Result<Self, EngineError> {
        let path = match &options.path {
            Some(path) => path.clone(),
            None => find_engine_path().ok_or(EngineError::NotFound)?,
        };
        tracing::info!("Starting analysis engine at {:?}", path);

        let mut process = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let mut stdin = process.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = process.stdout.take().ok_or(EngineError::NoStdout)?;

        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(64);
        let (banner_tx, banner_rx) = oneshot::channel::<String>();

        // Reader: forwards every line and answers the banner request once.
        let reader_events = event_tx.clone();
        tokio::spawn(async move {
            let mut banner_tx = Some(banner_tx);
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        tracing::trace!("ENGINE << {}", line);
                        if let Ok(AnalysisLine::Banner(name)) = parse_line(&line) {
                            if let Some(tx) = banner_tx.take() {
                                let _ = tx.send(name);
                            }
                        }
                        let event = EngineEvent::Raw {
                            direction: LineDirection::FromEngine,
                            line,
                        };
                        if reader_events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::warn!("Engine stdout EOF - engine closed");
                        let _ = reader_events.send(EngineEvent::Exited).await;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading engine stdout: {}", e);
                        let _ = reader_events.send(EngineEvent::Exited).await;
                        break;
                    }
                }
            }
            tracing::debug!("Engine reader task exiting");
        });

        let banner = match tokio::time::timeout(BANNER_TIMEOUT, banner_rx).await {
            Ok(Ok(name)) => {
                tracing::info!("Engine banner: {}", name);
                Some(name)
            }
            Ok(Err(_)) => {
                tracing::warn!("Engine closed before printing a banner");
                None
            }
            Err(_) => {
                tracing::warn!("No engine banner within {:?}", BANNER_TIMEOUT);
                None
            }
        };

        let mut setup = String::new();
        if let (Some(_), Some(ini)) = (&banner, &options.variants_ini) {
            setup.push_str("load <<EOF\n");
            setup.push_str(ini);
            setup.push_str("\nEOF\n");
        }
        if let Some(hash_mb) = options.hash_mb {
            let hash_mb = hash_mb.clamp(1, 2048);
            setup.push_str(&EngineCommand::set_option("Hash", hash_mb).to_line());
            setup.push('\n');
        }
        setup.push_str("isready\n");
        stdin.write_all(setup.as_bytes()).await?;
        stdin.flush().await?;

        // Writer: the only owner of stdin from here on.
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(64);
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(line) = stdin_rx.recv().await {
                tracing::trace!("ENGINE >> {}", line);
                let _ = writer_events
                    .send(EngineEvent::Raw {
                        direction: LineDirection::ToEngine,
                        line: line.clone(),
                    })
                    .await;
                let write = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if let Err(e) = write.await {
                    tracing::error!("Failed to write to engine stdin: {}", e);
                    break;
                }
            }
            tracing::debug!("Engine writer task exiting");
        });

        // Command processor
        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(64);
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                tracing::debug!("Processing engine command: {:?}", cmd);
                let quit = cmd == EngineCommand::Quit;
                if stdin_tx.send(cmd.to_line()).await.is_err() || quit {
                    break;
                }
            }
            tracing::debug!("Engine command task exiting");
        });

        Ok(Self {
            process,
            command_tx,
            event_rx,
            banner,
        })
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn send_command(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    pub async fn shutdown(mut self) {
        let _ = self.send_command(EngineCommand::Quit).await;
        let _ = tokio::time::timeout(Duration::from_secs(1), self.process.wait()).await;
        let _ = self.process.kill().await;
    }
}

/// Find a variant-capable engine in common locations.
fn find_engine_path() -> Option<PathBuf> {
    let candidates = [
        "/usr/local/bin/fairy-stockfish",
        "/usr/bin/fairy-stockfish",
        "/opt/homebrew/bin/fairy-stockfish",
        "/usr/games/fairy-stockfish",
    ];
    candidates
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .or_else(|| {
            std::process::Command::new("fairy-stockfish")
                .arg("quit")
                .output()
                .ok()
                .map(|_| PathBuf::from("fairy-stockfish"))
        })
}
