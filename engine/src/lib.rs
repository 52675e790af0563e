pub mod commands;
pub mod process;
pub mod protocol;

pub use commands::{analysis_commands, stop_commands, AnalysisSettings};
pub use process::{AnalysisEngine, EngineOptions};
pub use protocol::{parse_line, AnalysisLine, ProtocolError};

/// Commands sent to the analysis engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    SetOption { name: String, value: Option<String> },
    Position { fen: String },
    Go(GoParams),
    Stop,
    IsReady,
    Quit,
}

impl EngineCommand {
    pub fn set_option(name: &str, value: impl ToString) -> Self {
        Self::SetOption {
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// The protocol line for this command, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::SetOption {
                name,
                value: Some(value),
            } => format!("setoption name {} value {}", name, value),
            Self::SetOption { name, value: None } => format!("setoption name {}", name),
            Self::Position { fen } => format!("position fen {}", fen),
            Self::Go(params) => {
                let mut go = "go".to_string();
                if let Some(movetime) = params.movetime {
                    go.push_str(&format!(" movetime {}", movetime));
                }
                if let Some(depth) = params.depth {
                    go.push_str(&format!(" depth {}", depth));
                }
                if params.movetime.is_none() && params.depth.is_none() {
                    go.push_str(" infinite");
                }
                go
            }
            Self::Stop => "stop".to_string(),
            Self::IsReady => "isready".to_string(),
            Self::Quit => "quit".to_string(),
        }
    }
}

/// Parameters for the "go" command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoParams {
    pub movetime: Option<u64>,
    pub depth: Option<u32>,
}

/// Events received from the engine process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Raw {
        direction: LineDirection,
        line: String,
    },
    /// The engine's stdout closed.
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    ToEngine,
    FromEngine,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Analysis engine not found")]
    NotFound,
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Engine command channel closed")]
    ChannelClosed,
}
