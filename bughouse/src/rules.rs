//! Chess-rules collaborator used to validate moves and derive positions.
//!
//! The sync layer never inspects pieces itself; it goes through
//! [`RulesEngine`]. [`CozyRules`] is the stock implementation on top of
//! cozy-chess. Board moves go through cozy-chess move generation; pocket
//! drops (`N@e3`) are checked here and the resulting position is handed
//! back to cozy-chess for validation.

use std::collections::BTreeMap;

use cozy_chess::{Board, GameStatus, Move, Piece, Rank, Square};

use crate::fen::{self, FenError};
use crate::notation;

/// Result of playing one move on a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub fen: String,
    pub san: String,
    pub is_check: bool,
    pub is_terminal: bool,
    /// Captured piece in FEN letter case, bound for the partner's pocket.
    pub captured: Option<char>,
    /// The move in coordinate form as it goes on the wire.
    pub uci: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Invalid move notation: {0}")]
    InvalidNotation(String),
    #[error("Piece is not in the pocket: {0}")]
    NotInPocket(String),
    #[error("FEN error: {0}")]
    Fen(#[from] FenError),
}

pub trait RulesEngine: Send + Sync {
    fn set_position(&mut self, fen: &str) -> Result<(), RulesError>;

    /// Current position as a bughouse FEN.
    fn position(&self) -> &str;

    fn apply_move(&mut self, mv: &str) -> Result<MoveOutcome, RulesError>;

    fn is_check(&self) -> bool;

    /// Legal destination squares keyed by origin square.
    fn legal_destinations(&self) -> BTreeMap<String, Vec<String>>;

    /// Numbered SAN rendering of a coordinate move list from the current
    /// position. Stops at the first move that does not apply.
    fn variation_to_notation(&self, moves: &[String]) -> String;
}

/// cozy-chess backed rules for one board.
#[derive(Debug, Clone)]
pub struct CozyRules {
    board: Board,
    pocket: String,
    fen: String,
}

impl CozyRules {
    pub fn new(fen: &str) -> Result<Self, RulesError> {
        let (board, pocket) = fen::parse_board(fen)?;
        Ok(Self {
            fen: fen::format_board(&board, &pocket),
            board,
            pocket,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    fn resolve(&self, text: &str) -> Result<Move, RulesError> {
        let mv = notation::parse_uci_move(text)
            .ok_or_else(|| RulesError::InvalidNotation(text.to_string()))?;
        let legal = notation::legal_moves(&self.board);
        let mv = notation::convert_uci_castling_to_cozy(mv, &legal);
        if legal.contains(&mv) {
            Ok(mv)
        } else {
            Err(RulesError::IllegalMove(text.to_string()))
        }
    }

    fn captured_piece(&self, mv: Move) -> Option<char> {
        let mover = self.board.side_to_move();
        let target_color = self.board.color_on(mv.to)?;
        if target_color == mover {
            // castling onto own rook
            return None;
        }
        let piece = self.board.piece_on(mv.to)?;
        let letter = notation::piece_letter(piece);
        Some(match target_color {
            cozy_chess::Color::White => letter,
            cozy_chess::Color::Black => letter.to_ascii_lowercase(),
        })
    }

    fn en_passant_capture(&self, mv: Move) -> Option<char> {
        let is_pawn = self.board.piece_on(mv.from) == Some(cozy_chess::Piece::Pawn);
        if is_pawn && mv.from.file() != mv.to.file() && self.board.piece_on(mv.to).is_none() {
            Some(match self.board.side_to_move() {
                cozy_chess::Color::White => 'p',
                cozy_chess::Color::Black => 'P',
            })
        } else {
            None
        }
    }

    /// Play a pocket drop such as `N@e3` or `p@d6`.
    ///
    /// The piece must be in the mover's pocket and the square empty. Pawns
    /// never land on the first or last rank, and the drop may not leave the
    /// mover's king in check.
    fn play_drop(&mut self, text: &str) -> Result<MoveOutcome, RulesError> {
        let (piece, square) =
            parse_drop(text).ok_or_else(|| RulesError::InvalidNotation(text.to_string()))?;
        let mover = self.board.side_to_move();
        let letter = notation::piece_letter(piece);
        let pocket_letter = match mover {
            cozy_chess::Color::White => letter,
            cozy_chess::Color::Black => letter.to_ascii_lowercase(),
        };
        let slot = self
            .pocket
            .find(pocket_letter)
            .ok_or_else(|| RulesError::NotInPocket(text.to_string()))?;
        if self.board.occupied().has(square)
            || (piece == Piece::Pawn && matches!(square.rank(), Rank::First | Rank::Eighth))
        {
            return Err(RulesError::IllegalMove(text.to_string()));
        }

        let plain = self.board.to_string();
        let fields: Vec<&str> = plain.split_whitespace().collect();
        let [placement, _, castling, _, halfmove, fullmove] = fields.as_slice() else {
            return Err(FenError::InvalidFormat(plain.clone()).into());
        };
        let placement = fen::place_piece(
            placement,
            square.file() as usize,
            square.rank() as usize,
            pocket_letter,
        )?;
        let (next_side, fullmove) = match mover {
            cozy_chess::Color::White => ('b', fullmove.parse::<u16>().unwrap_or(1)),
            cozy_chess::Color::Black => ('w', fullmove.parse::<u16>().unwrap_or(1) + 1),
        };
        let halfmove = if piece == Piece::Pawn {
            0
        } else {
            halfmove.parse::<u8>().unwrap_or(0).saturating_add(1)
        };
        // cozy-chess refuses a position whose side not to move is in check,
        // which is exactly a drop that leaves the mover's king attacked.
        let board: Board = format!("{placement} {next_side} {castling} - {halfmove} {fullmove}")
            .parse()
            .map_err(|_| RulesError::IllegalMove(text.to_string()))?;

        self.board = board;
        self.pocket.remove(slot);
        self.fen = fen::format_board(&self.board, &self.pocket);
        let uci = format!("{}@{}", letter, notation::format_square(square));
        let suffix = match self.board.status() {
            GameStatus::Won => "#",
            _ if self.is_check() => "+",
            _ => "",
        };
        Ok(MoveOutcome {
            fen: self.fen.clone(),
            san: format!("{uci}{suffix}"),
            is_check: self.is_check(),
            is_terminal: self.board.status() != GameStatus::Ongoing,
            captured: None,
            uci,
        })
    }
}

/// `N@e3` into the dropped piece and its square. The letter may be either case.
fn parse_drop(text: &str) -> Option<(Piece, Square)> {
    let (piece, square) = text.split_once('@')?;
    let mut letters = piece.chars();
    let piece = match (letters.next()?.to_ascii_uppercase(), letters.next()) {
        ('P', None) => Piece::Pawn,
        ('N', None) => Piece::Knight,
        ('B', None) => Piece::Bishop,
        ('R', None) => Piece::Rook,
        ('Q', None) => Piece::Queen,
        _ => return None,
    };
    Some((piece, square.parse().ok()?))
}

impl RulesEngine for CozyRules {
    fn set_position(&mut self, fen: &str) -> Result<(), RulesError> {
        *self = Self::new(fen)?;
        Ok(())
    }

    fn position(&self) -> &str {
        &self.fen
    }

    fn apply_move(&mut self, text: &str) -> Result<MoveOutcome, RulesError> {
        if text.contains('@') {
            return self.play_drop(text);
        }
        let mv = self.resolve(text)?;
        let san = notation::generate_san(&self.board, mv);
        let captured = self
            .captured_piece(mv)
            .or_else(|| self.en_passant_capture(mv));
        let uci = notation::format_uci_move(notation::convert_cozy_castling_to_uci(&self.board, mv));

        self.board.play_unchecked(mv);
        self.fen = fen::format_board(&self.board, &self.pocket);
        Ok(MoveOutcome {
            fen: self.fen.clone(),
            san,
            is_check: self.is_check(),
            is_terminal: self.board.status() != GameStatus::Ongoing,
            captured,
            uci,
        })
    }

    fn is_check(&self) -> bool {
        !self.board.checkers().is_empty()
    }

    fn legal_destinations(&self) -> BTreeMap<String, Vec<String>> {
        let mut dests: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for mv in notation::legal_moves(&self.board) {
            let shown = notation::convert_cozy_castling_to_uci(&self.board, mv);
            let to = notation::format_square(shown.to);
            let entry = dests.entry(notation::format_square(shown.from)).or_default();
            if !entry.contains(&to) {
                entry.push(to);
            }
        }
        dests
    }

    fn variation_to_notation(&self, moves: &[String]) -> String {
        let mut scratch = self.clone();
        let mut number = self.board.fullmove_number();
        let mut out = Vec::new();
        for (idx, text) in moves.iter().enumerate() {
            let white_to_move = scratch.board.side_to_move() == cozy_chess::Color::White;
            let Ok(outcome) = scratch.apply_move(text) else {
                break;
            };
            if white_to_move {
                out.push(format!("{}. {}", number, outcome.san));
            } else if idx == 0 {
                out.push(format!("{}... {}", number, outcome.san));
            } else {
                out.push(outcome.san);
            }
            if !white_to_move {
                number += 1;
            }
        }
        out.join(" ")
    }
}
