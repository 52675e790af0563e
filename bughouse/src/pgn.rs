//! Portable move-text export for bughouse games.
//!
//! Each move is prefixed with a label `{n}{L}.` where `n` is the full-move
//! number on that board and `L` the board letter, upper-case for a White
//! move and lower-case for a Black move: `1A.e4 1B.d4 1a.e5`. When the game
//! starts with Black to move the first label ends in `...`.

use std::fmt;
use std::str::FromStr;

use enum_map::EnumMap;

use crate::fen;
use crate::history::MoveHistory;
use crate::step::Step;
use crate::types::{BoardId, Color, PlyIndex};

/// Parsed form of a move label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveLabel {
    pub number: u32,
    pub board: BoardId,
    pub color: Color,
    /// Rendered with `...` (Black opening the game).
    pub continuation: bool,
}

impl MoveLabel {
    fn letter(&self) -> char {
        match self.color {
            Color::White => self.board.letter(),
            Color::Black => self.board.letter().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for MoveLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dots = if self.continuation { "..." } else { "." };
        write!(f, "{}{}{}", self.number, self.letter(), dots)
    }
}

impl FromStr for MoveLabel {
    type Err = PgnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PgnError::InvalidLabel(s.to_string());
        let digits_end = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let number: u32 = s[..digits_end].parse().map_err(|_| invalid())?;
        let mut rest = s[digits_end..].chars();
        let letter = rest.next().ok_or_else(invalid)?;
        let board = BoardId::from_letter(letter).ok_or_else(invalid)?;
        let color = if letter.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let continuation = match rest.as_str() {
            "." => false,
            "..." => true,
            _ => return Err(invalid()),
        };
        Ok(Self {
            number,
            board,
            color,
            continuation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PgnError {
    #[error("Invalid move label: {0}")]
    InvalidLabel(String),
    #[error("Move token without label: {0}")]
    MissingLabel(String),
}

/// Tag pairs written above the move text.
#[derive(Debug, Clone)]
pub struct PgnHeaders {
    pub event: String,
    pub site: String,
    pub date: String,
    pub white_a: String,
    pub black_a: String,
    pub white_b: String,
    pub black_b: String,
    pub result: String,
    pub variant: String,
}

impl Default for PgnHeaders {
    fn default() -> Self {
        Self {
            event: "?".to_string(),
            site: "?".to_string(),
            date: "????.??.??".to_string(),
            white_a: "?".to_string(),
            black_a: "?".to_string(),
            white_b: "?".to_string(),
            black_b: "?".to_string(),
            result: "*".to_string(),
            variant: "Bughouse".to_string(),
        }
    }
}

/// Running per-board move counters used while labelling plies.
///
/// Feed it the steps after the initial one, in play order.
#[derive(Debug, Clone)]
pub struct Labeller {
    black_starts: EnumMap<BoardId, bool>,
    plies: EnumMap<BoardId, u32>,
    first: bool,
    game_black_starts: bool,
}

impl Labeller {
    pub fn new(initial: &Step) -> Self {
        let black_starts = EnumMap::from_fn(|board| {
            fen::side_to_move(initial.fen_for(board)) == Ok(Color::Black)
        });
        Self {
            black_starts,
            plies: EnumMap::default(),
            first: true,
            game_black_starts: initial.turn_color == Color::Black,
        }
    }

    /// Label for `step`, or `None` for a step without a mover.
    pub fn label(&mut self, step: &Step) -> Option<MoveLabel> {
        let (board, color) = step.mover()?;
        self.plies[board] += 1;
        let offset = u32::from(self.black_starts[board]);
        let continuation = self.first && self.game_black_starts && color == Color::Black;
        self.first = false;
        Some(MoveLabel {
            number: (self.plies[board] + offset + 1) / 2,
            board,
            color,
            continuation,
        })
    }
}

fn token(label: MoveLabel, step: &Step) -> String {
    format!("{}{}", label, step.san.as_deref().unwrap_or("?"))
}

/// Move text for main-line plies `1..=upto`.
///
/// With `inside_variation = Some(idx)` and a variation open at or before
/// `upto`, the main line is followed up to the fork and then the variation
/// steps `0..=idx` are rendered in its place.
pub fn movetext(history: &MoveHistory, upto: PlyIndex, inside_variation: Option<usize>) -> String {
    let mut labeller = Labeller::new(history.initial());
    let mut tokens = Vec::new();
    let upto = upto.min(history.last_ply());
    let fork = history.open_handle().map(|h| h.fork_ply());

    for ply in 1..=upto {
        if let (Some(fork), Some(idx)) = (fork, inside_variation) {
            if ply == fork {
                for step in history.variation(fork).unwrap_or(&[]).iter().take(idx + 1) {
                    if let Some(label) = labeller.label(step) {
                        tokens.push(token(label, step));
                    }
                }
                break;
            }
        }
        let Some(step) = history.step(ply) else { break };
        if let Some(label) = labeller.label(step) {
            tokens.push(token(label, step));
        }
    }
    tokens.join(" ")
}

/// Full export: tag pairs, a blank line, the move text and the result.
pub fn export(
    history: &MoveHistory,
    upto: PlyIndex,
    inside_variation: Option<usize>,
    headers: &PgnHeaders,
) -> String {
    let initial = history.initial();
    let fen_pair = format!("{} | {}", initial.fen, initial.fen_b);
    let tags = [
        ("Event", headers.event.as_str()),
        ("Site", headers.site.as_str()),
        ("Date", headers.date.as_str()),
        ("WhiteA", headers.white_a.as_str()),
        ("BlackA", headers.black_a.as_str()),
        ("WhiteB", headers.white_b.as_str()),
        ("BlackB", headers.black_b.as_str()),
        ("Result", headers.result.as_str()),
        ("Variant", headers.variant.as_str()),
        ("FEN", fen_pair.as_str()),
        ("SetUp", "1"),
    ];

    let mut out = String::new();
    for (name, value) in tags {
        out.push_str(&format!("[{} \"{}\"]\n", name, value));
    }
    out.push('\n');
    let moves = movetext(history, upto, inside_variation);
    if !moves.is_empty() {
        out.push_str(&moves);
        out.push(' ');
    }
    out.push_str(&headers.result);
    out.push('\n');
    out
}

/// Split move text back into labels and notation. Result tokens are skipped.
pub fn parse_movetext(text: &str) -> Result<Vec<(MoveLabel, String)>, PgnError> {
    let mut moves = Vec::new();
    for tok in text.split_whitespace() {
        if matches!(tok, "*" | "1-0" | "0-1" | "1/2-1/2") {
            continue;
        }
        let dot = tok
            .find('.')
            .ok_or_else(|| PgnError::MissingLabel(tok.to_string()))?;
        let end = tok[dot..]
            .find(|c: char| c != '.')
            .map_or(tok.len(), |i| dot + i);
        let label: MoveLabel = tok[..end].parse()?;
        moves.push((label, tok[end..].to_string()));
    }
    Ok(moves)
}
