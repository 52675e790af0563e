//! Local engine analysis of the displayed position.

use bughouse::{BoardId, EvaluationRecord};
use engine::{analysis_commands, parse_line, stop_commands, AnalysisLine, EngineCommand};

use super::SyncController;
use crate::events::{Effect, RenderUpdate};
use crate::view::EvaluationView;

/// Engine handshake and search state.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct AnalysisState {
    board: Option<BoardId>,
    /// `readyok` seen since the last stop.
    ready: bool,
    /// An `isready` is outstanding.
    awaiting_ready: bool,
    searching: bool,
}

impl AnalysisState {
    pub(super) fn board(&self) -> Option<BoardId> {
        self.board
    }
}

impl SyncController {
    /// Start or stop analysing `board`. Only one board is analysed at a time.
    pub fn toggle_local_analysis(&mut self, board: BoardId, enabled: bool) -> Vec<Effect> {
        if enabled {
            tracing::info!(board = %board, "Starting local analysis");
            self.analysis.board = Some(board);
            return self.restart_analysis();
        }
        if self.analysis.board != Some(board) {
            return Vec::new();
        }
        tracing::info!(board = %board, "Stopping local analysis");
        let mut effects = self.stop_search();
        self.analysis.board = None;
        effects.push(Effect::Render(RenderUpdate::ClearEvaluation { board }));
        effects
    }

    pub fn analysing(&self) -> Option<BoardId> {
        self.analysis.board
    }

    /// Search the displayed position again after it changed.
    pub(super) fn restart_analysis(&mut self) -> Vec<Effect> {
        if self.analysis.board.is_none() {
            return Vec::new();
        }
        let mut effects = self.stop_search();
        effects.extend(self.request_search());
        effects
    }

    fn stop_search(&mut self) -> Vec<Effect> {
        if !self.analysis.searching {
            return Vec::new();
        }
        self.analysis.searching = false;
        self.analysis.ready = false;
        self.analysis.awaiting_ready = true;
        stop_commands().into_iter().map(Effect::Engine).collect()
    }

    fn request_search(&mut self) -> Vec<Effect> {
        let Some(board) = self.analysis.board else {
            return Vec::new();
        };
        if self.analysis.searching {
            return Vec::new();
        }
        if !self.analysis.ready {
            if self.analysis.awaiting_ready {
                return Vec::new();
            }
            self.analysis.awaiting_ready = true;
            return vec![Effect::Engine(EngineCommand::IsReady)];
        }
        self.analysis.searching = true;
        let fen = self.boards[board].fen().to_string();
        tracing::debug!(board = %board, %fen, "Engine search");
        analysis_commands(&self.config.analysis_settings(), &fen)
            .into_iter()
            .map(Effect::Engine)
            .collect()
    }

    /// Handle one line of engine output.
    pub fn on_engine_line(&mut self, line: &str) -> Vec<Effect> {
        let parsed = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!("Dropping engine line: {}", err);
                return Vec::new();
            }
        };
        match parsed {
            AnalysisLine::Ready => {
                self.analysis.ready = true;
                self.analysis.awaiting_ready = false;
                self.request_search()
            }
            AnalysisLine::Banner(banner) => {
                tracing::info!("Analysis engine: {}", banner);
                Vec::new()
            }
            AnalysisLine::EngineError { message, fatal } => {
                tracing::warn!(fatal, "Engine reported an error: {}", message);
                let mut effects = vec![Effect::Render(RenderUpdate::Notice { message, fatal })];
                if fatal {
                    effects.extend(self.reset_analysis());
                }
                effects
            }
            AnalysisLine::Clear => self
                .analysis
                .board
                .map(|board| Effect::Render(RenderUpdate::ClearEvaluation { board }))
                .into_iter()
                .collect(),
            AnalysisLine::Evaluation(record) => self.on_evaluation(record),
            AnalysisLine::Ignored => Vec::new(),
        }
    }

    /// The engine process went away.
    pub fn on_engine_exit(&mut self) -> Vec<Effect> {
        tracing::warn!("Analysis engine exited");
        let mut effects = vec![Effect::Render(RenderUpdate::Notice {
            message: "Analysis engine exited".to_string(),
            fatal: true,
        })];
        effects.extend(self.reset_analysis());
        effects
    }

    fn reset_analysis(&mut self) -> Vec<Effect> {
        let board = self.analysis.board;
        self.analysis = AnalysisState::default();
        board
            .map(|board| Effect::Render(RenderUpdate::ClearEvaluation { board }))
            .into_iter()
            .collect()
    }

    fn on_evaluation(&mut self, record: EvaluationRecord) -> Vec<Effect> {
        if !self.analysis.searching {
            return Vec::new();
        }
        let Some(view) = self.evaluation_view(record.clone()) else {
            return Vec::new();
        };
        if record.is_primary() && !self.cursor.in_variation {
            self.history.set_evaluation(self.cursor.ply, record);
        }
        vec![Effect::Render(RenderUpdate::Evaluation(view))]
    }

    /// Render an evaluation of the analysed board's displayed position.
    pub(super) fn evaluation_view(&self, record: EvaluationRecord) -> Option<EvaluationView> {
        let board = self.analysis.board?;
        let state = &self.boards[board];
        Some(EvaluationView {
            board,
            ply: self.cursor.ply,
            score: record.score.format_for(state.turn),
            line: state.rules.variation_to_notation(&record.pv),
            record,
        })
    }
}
