//! Data handed to the renderer.

use std::collections::BTreeMap;

use bughouse::{BoardId, ClockReading, Color, EvaluationRecord, GameStatus, PendingMove, PlyIndex, SessionMode};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub board: BoardId,
    pub fen: String,
    pub last_move: Option<String>,
    pub turn: Color,
    pub check: bool,
    /// Legal destinations keyed by origin square; empty when the local
    /// player cannot move here.
    pub dests: BTreeMap<String, Vec<String>>,
    pub premove: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockView {
    pub board: BoardId,
    pub white: ClockReading,
    pub black: ClockReading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveListEntry {
    pub ply: PlyIndex,
    pub board: BoardId,
    pub label: String,
    pub san: String,
    /// Part of the open variation rather than the main line.
    pub in_variation: bool,
    /// Main-line ply that has a variation attached.
    pub has_variation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationView {
    pub board: BoardId,
    pub ply: PlyIndex,
    /// Score from White's point of view, e.g. `+1.5` or `#-3`.
    pub score: String,
    /// Principal variation in numbered SAN.
    pub line: String,
    pub record: EvaluationRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Draw,
    DrawRejected,
    Rematch,
    RematchRejected,
}

/// Complete session state, as returned to new subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub game_id: String,
    pub mode: SessionMode,
    pub status: GameStatus,
    pub result: String,
    /// Latest server-confirmed ply.
    pub ply: Option<PlyIndex>,
    pub view_ply: PlyIndex,
    pub in_variation: bool,
    pub boards: Vec<BoardView>,
    pub clocks: Vec<ClockView>,
    pub moves: Vec<MoveListEntry>,
    pub pending: Vec<PendingMove>,
    pub connected: bool,
    pub analysing: Option<BoardId>,
    pub display: DisplayPreferences,
}

/// Renderer switches taken from the session config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPreferences {
    /// Hide the pieces on both boards.
    pub blindfold: bool,
    pub animation: bool,
    /// Clocks are shown but never run when off.
    pub clock_on: bool,
}
