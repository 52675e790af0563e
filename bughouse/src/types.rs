//! Identifiers shared by every part of the sync layer: boards, colors,
//! clock pairs, server game status codes and the session mode.

use enum_map::Enum;
use serde::{Deserialize, Serialize};

/// Global ply counter shared by both boards. Ply 0 is the initial position.
pub type PlyIndex = usize;

/// One of the two linked boards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Enum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BoardId {
    A,
    B,
}

impl BoardId {
    pub const ALL: [BoardId; 2] = [BoardId::A, BoardId::B];

    /// The board paired with this one.
    pub fn partner(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Upper-case board letter as used in move labels.
    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter().to_ascii_lowercase())
    }
}

/// Side color on a single board.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Enum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }

    /// Parse the side-to-move field of a FEN (`w` / `b`).
    pub fn from_fen_field(field: &str) -> Option<Self> {
        match field {
            "w" => Some(Self::White),
            "b" => Some(Self::Black),
            _ => None,
        }
    }
}

impl From<cozy_chess::Color> for Color {
    fn from(c: cozy_chess::Color) -> Self {
        match c {
            cozy_chess::Color::White => Self::White,
            cozy_chess::Color::Black => Self::Black,
        }
    }
}

impl From<Color> for cozy_chess::Color {
    fn from(c: Color) -> Self {
        match c {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-color clock values of one board in milliseconds.
///
/// Travels as a `[white, black]` array on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct Clocks {
    pub white: u64,
    pub black: u64,
}

impl Clocks {
    pub fn new(white: u64, black: u64) -> Self {
        Self { white, black }
    }

    pub fn get(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    pub fn set(&mut self, color: Color, ms: u64) {
        match color {
            Color::White => self.white = ms,
            Color::Black => self.black = ms,
        }
    }
}

impl From<[u64; 2]> for Clocks {
    fn from([white, black]: [u64; 2]) -> Self {
        Self { white, black }
    }
}

impl From<Clocks> for [u64; 2] {
    fn from(c: Clocks) -> Self {
        [c.white, c.black]
    }
}

/// Server game status. Negative codes are live games, everything else is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum GameStatus {
    #[default]
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Draw,
    Flag,
    Abandoned,
    Cheat,
    NoStart,
    InvalidMove,
    UnknownFinish,
    VariantEnd,
    Claim,
}

impl GameStatus {
    const ORDER: [GameStatus; 16] = [
        Self::Created,
        Self::Started,
        Self::Aborted,
        Self::Mate,
        Self::Resign,
        Self::Stalemate,
        Self::Timeout,
        Self::Draw,
        Self::Flag,
        Self::Abandoned,
        Self::Cheat,
        Self::NoStart,
        Self::InvalidMove,
        Self::UnknownFinish,
        Self::VariantEnd,
        Self::Claim,
    ];

    /// Server integer code (`Created` = -2 ... `Claim` = 13).
    pub fn code(self) -> i32 {
        Self::ORDER
            .iter()
            .position(|s| *s == self)
            .map_or(-2, |idx| idx as i32 - 2)
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let idx = usize::try_from(code + 2).ok()?;
        Self::ORDER.get(idx).copied()
    }

    pub fn is_terminal(self) -> bool {
        self.code() >= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown game status code: {0}")]
pub struct UnknownStatus(pub i32);

impl TryFrom<i32> for GameStatus {
    type Error = UnknownStatus;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(UnknownStatus(code))
    }
}

impl From<GameStatus> for i32 {
    fn from(s: GameStatus) -> Self {
        s.code()
    }
}

/// Whether the session follows a live round or a local analysis board.
///
/// Resolved once at construction; history and clocks consult it instead of
/// probing the session type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Live,
    Analysis,
}

impl SessionMode {
    pub fn supports_variations(self) -> bool {
        matches!(self, Self::Analysis)
    }

    pub fn clocks_tick(self) -> bool {
        matches!(self, Self::Live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_server() {
        assert_eq!(GameStatus::Created.code(), -2);
        assert_eq!(GameStatus::Started.code(), -1);
        assert_eq!(GameStatus::Aborted.code(), 0);
        assert_eq!(GameStatus::Flag.code(), 6);
        assert_eq!(GameStatus::Claim.code(), 13);
        assert_eq!(GameStatus::from_code(14), None);
        assert!(!GameStatus::Started.is_terminal());
        assert!(GameStatus::Mate.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_codes() {
        let status: GameStatus = serde_json::from_str("-1").unwrap();
        assert_eq!(status, GameStatus::Started);
        assert_eq!(serde_json::to_string(&GameStatus::Resign).unwrap(), "2");
        assert!(serde_json::from_str::<GameStatus>("42").is_err());
    }

    #[test]
    fn test_clocks_wire_format() {
        let clocks: Clocks = serde_json::from_str("[58000, 60000]").unwrap();
        assert_eq!(clocks.get(Color::White), 58000);
        assert_eq!(clocks.get(Color::Black), 60000);
        assert_eq!(serde_json::to_string(&clocks).unwrap(), "[58000,60000]");
    }

    #[test]
    fn test_board_partner_and_letters() {
        assert_eq!(BoardId::A.partner(), BoardId::B);
        assert_eq!(BoardId::from_letter('b'), Some(BoardId::B));
        assert_eq!(BoardId::from_letter('c'), None);
        assert_eq!(serde_json::to_string(&BoardId::A).unwrap(), "\"a\"");
    }
}
