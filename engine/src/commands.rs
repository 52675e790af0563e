//! Command sequences for starting and stopping a local analysis.

use crate::{EngineCommand, GoParams};

/// Depth at or above which analysis runs without a time limit.
pub const UNLIMITED_DEPTH: u32 = 99;

/// Time cap for depth-limited analysis.
pub const ANALYSIS_MOVETIME_MS: u64 = 90_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub variant: String,
    /// NNUE file to evaluate with; `None` disables NNUE.
    pub eval_file: Option<String>,
    pub threads: u32,
    pub multipv: u32,
    pub max_depth: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            variant: "bughouse".to_string(),
            eval_file: None,
            threads: default_threads(),
            multipv: 1,
            max_depth: 18,
        }
    }
}

/// One thread less than the machine has, at least one.
pub fn default_threads() -> u32 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    u32::try_from(cpus.saturating_sub(1)).unwrap_or(1).max(1)
}

/// Options, position and search command for analysing `fen`.
pub fn analysis_commands(settings: &AnalysisSettings, fen: &str) -> Vec<EngineCommand> {
    let mut cmds = Vec::with_capacity(8);
    if settings.variant != "chess" {
        cmds.push(EngineCommand::set_option("UCI_Variant", &settings.variant));
    }
    match &settings.eval_file {
        Some(file) if !file.is_empty() => {
            cmds.push(EngineCommand::set_option("Use NNUE", true));
            cmds.push(EngineCommand::set_option("EvalFile", file));
        }
        _ => cmds.push(EngineCommand::set_option("Use NNUE", false)),
    }
    cmds.push(EngineCommand::set_option("Threads", settings.threads.max(1)));
    cmds.push(EngineCommand::set_option("MultiPV", settings.multipv));
    cmds.push(EngineCommand::Position {
        fen: fen.to_string(),
    });

    let go = if settings.max_depth >= UNLIMITED_DEPTH {
        GoParams {
            movetime: None,
            depth: Some(UNLIMITED_DEPTH),
        }
    } else {
        GoParams {
            movetime: Some(ANALYSIS_MOVETIME_MS),
            depth: Some(settings.max_depth),
        }
    };
    cmds.push(EngineCommand::Go(go));
    cmds
}

/// Stop the search and wait for the engine to settle.
pub fn stop_commands() -> [EngineCommand; 2] {
    [EngineCommand::Stop, EngineCommand::IsReady]
}
