//! A single recorded ply covering both boards.

use serde::{Deserialize, Serialize};

use crate::analysis::EvaluationRecord;
use crate::types::{BoardId, Clocks, Color};

/// Chat line attached to a ply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnnotation {
    pub message: String,
    pub username: String,
    #[serde(default)]
    pub time: u64,
}

/// One completed move on one board, with the resulting positions of both
/// boards.
///
/// The wire shape matches the server's `steps` entries. Step 0 is the
/// initial position and carries no board name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Board A position after this ply.
    pub fen: String,
    /// Board B position after this ply.
    #[serde(default)]
    pub fen_b: String,
    /// Last move played on board A, coordinate form.
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub move_a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_b: Option<String>,
    #[serde(default)]
    pub check: bool,
    /// Side to move on the board this ply was played on.
    #[serde(default)]
    pub turn_color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
    #[serde(default, rename = "boardName", skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clocks: Option<Clocks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clocks_b: Option<Clocks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<char>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chat: Vec<ChatAnnotation>,
    #[serde(skip)]
    pub evaluation: Option<EvaluationRecord>,
    /// Alternate continuation forked at this ply. Only used in analysis.
    #[serde(skip)]
    pub variation: Option<Vec<Step>>,
}

impl Step {
    /// Initial step for a pair of starting positions.
    pub fn initial(fen_a: impl Into<String>, fen_b: impl Into<String>, turn_color: Color) -> Self {
        Self {
            fen: fen_a.into(),
            fen_b: fen_b.into(),
            turn_color,
            ..Default::default()
        }
    }

    pub fn fen_for(&self, board: BoardId) -> &str {
        match board {
            BoardId::A => &self.fen,
            BoardId::B => &self.fen_b,
        }
    }

    pub fn set_fen(&mut self, board: BoardId, fen: String) {
        match board {
            BoardId::A => self.fen = fen,
            BoardId::B => self.fen_b = fen,
        }
    }

    pub fn move_for(&self, board: BoardId) -> Option<&str> {
        match board {
            BoardId::A => self.move_a.as_deref(),
            BoardId::B => self.move_b.as_deref(),
        }
    }

    pub fn set_move(&mut self, board: BoardId, mv: Option<String>) {
        match board {
            BoardId::A => self.move_a = mv,
            BoardId::B => self.move_b = mv,
        }
    }

    pub fn clocks_for(&self, board: BoardId) -> Option<Clocks> {
        match board {
            BoardId::A => self.clocks,
            BoardId::B => self.clocks_b,
        }
    }

    /// Board and color that played this ply, `None` for the initial step.
    pub fn mover(&self) -> Option<(BoardId, Color)> {
        self.board.map(|b| (b, self.turn_color.opposite()))
    }

    /// True when this step records `mv` played on `board`.
    pub fn is_move(&self, board: BoardId, mv: &str) -> bool {
        self.board == Some(board) && self.move_for(board) == Some(mv)
    }
}
