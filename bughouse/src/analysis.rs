//! Engine evaluation types shared by the protocol parser and the sync layer.

use serde::{Deserialize, Serialize};

use crate::types::Color;

/// Engine evaluation score, from the side to move's point of view.
///
/// Serialized as `{"cp": n}` or `{"mate": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

impl Score {
    /// Centipawn value for comparison. Mate scores map to large values.
    pub fn to_cp(self) -> i32 {
        match self {
            Self::Cp(cp) => cp,
            Self::Mate(m) if m > 0 => 30000 - m * 100,
            Self::Mate(m) => -30000 - m * 100,
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Cp(cp) => Self::Cp(-cp),
            Self::Mate(m) => Self::Mate(-m),
        }
    }

    /// Score as shown next to the board, always from White's point of view.
    pub fn format_for(self, side_to_move: Color) -> String {
        let white_view = match side_to_move {
            Color::White => self,
            Color::Black => self.negate(),
        };
        match white_view {
            Self::Cp(cp) => format!("{:+.1}", cp as f64 / 100.0),
            Self::Mate(m) => format!("#{}", m),
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cp(cp) => write!(f, "cp {}", cp),
            Self::Mate(m) => write!(f, "mate {}", m),
        }
    }
}

/// Which side of the true score an engine bound reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Upper,
    Lower,
}

/// One parsed engine evaluation line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub depth: u32,
    pub seldepth: u32,
    pub multipv: u32,
    pub score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<Bound>,
    pub nodes: u64,
    pub time_ms: u64,
    /// Thousands of nodes per second, derived from nodes and elapsed time.
    pub knps: f64,
    /// Principal variation as coordinate moves.
    pub pv: Vec<String>,
}

impl EvaluationRecord {
    pub fn is_primary(&self) -> bool {
        self.multipv == 1
    }
}
