use bughouse::{BoardId, GameStatus};
use engine::EngineCommand;
use serde::Serialize;

use crate::messages::{ChatLine, OutboundMessage};
use crate::view::{BoardView, ClockView, EvaluationView, MoveListEntry, OfferKind};

/// What the controller asks its host to do after handling one input.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Message for the game server.
    Send(OutboundMessage),
    /// Command for the local analysis engine.
    Engine(EngineCommand),
    /// Update for the renderer.
    Render(RenderUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderUpdate {
    Board(BoardView),
    Clocks { clocks: Vec<ClockView> },
    MoveList {
        moves: Vec<MoveListEntry>,
        active_ply: usize,
        in_variation: bool,
    },
    Evaluation(EvaluationView),
    /// Blank the principal-variation display of a board.
    ClearEvaluation { board: BoardId },
    Status { status: GameStatus, result: String },
    Offer {
        offer: OfferKind,
        message: String,
        username: String,
        /// Made by someone other than the local player.
        incoming: bool,
    },
    Presence { username: String, online: bool },
    Chat(ChatLine),
    ChatHistory { lines: Vec<ChatLine> },
    Connection { connected: bool },
    Notice { message: String, fatal: bool },
}

/// Events broadcast from the session actor to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Render(RenderUpdate),
    /// Engine protocol log entry.
    EngineLine(EngineLogEntry),
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineLogEntry {
    pub direction: EngineDirection,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineDirection {
    ToEngine,
    FromEngine,
}

impl From<engine::LineDirection> for EngineDirection {
    fn from(direction: engine::LineDirection) -> Self {
        match direction {
            engine::LineDirection::ToEngine => Self::ToEngine,
            engine::LineDirection::FromEngine => Self::FromEngine,
        }
    }
}
