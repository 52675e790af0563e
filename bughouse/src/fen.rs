//! Bughouse FEN helpers.
//!
//! Bughouse positions carry the pocket in brackets right after the piece
//! placement (`.../RNBQKBNR[Qp] w KQkq - 0 1`) and mark promoted pieces with
//! `~`. The chess part is handed to cozy-chess, the pocket is kept as text.

use cozy_chess::Board;

use crate::types::Color;

/// Initial bughouse position with empty pockets.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR[] w KQkq - 0 1";

/// Separator between the two boards' FENs in a board message.
const PAIR_SEPARATOR: &str = " | ";

/// Side to move encoded in a FEN.
pub fn side_to_move(fen: &str) -> Result<Color, FenError> {
    fen.split_whitespace()
        .nth(1)
        .and_then(Color::from_fen_field)
        .ok_or_else(|| FenError::InvalidFormat(fen.to_string()))
}

/// Split a bughouse FEN into a plain chess FEN and its pocket contents.
pub fn split_pocket(fen: &str) -> Result<(String, String), FenError> {
    let mut fields = fen.split_whitespace();
    let placement = fields
        .next()
        .ok_or_else(|| FenError::InvalidFormat(fen.to_string()))?;
    let rest: Vec<&str> = fields.collect();

    let (board_part, pocket) = match placement.find('[') {
        Some(open) => {
            let close = placement[open..]
                .find(']')
                .map(|idx| open + idx)
                .ok_or_else(|| FenError::UnterminatedPocket(fen.to_string()))?;
            (&placement[..open], placement[open + 1..close].to_string())
        }
        None => (placement, String::new()),
    };

    let board_part: String = board_part.chars().filter(|c| *c != '~').collect();
    let mut plain = board_part;
    for field in rest {
        plain.push(' ');
        plain.push_str(field);
    }
    Ok((plain, pocket))
}

/// Re-attach a pocket to a plain chess FEN.
pub fn join_pocket(plain_fen: &str, pocket: &str) -> String {
    match plain_fen.split_once(' ') {
        Some((placement, rest)) => format!("{}[{}] {}", placement, pocket, rest),
        None => format!("{}[{}]", plain_fen, pocket),
    }
}

/// Add a captured piece to the pocket of a bughouse FEN.
pub fn add_to_pocket(fen: &str, piece: char) -> Result<String, FenError> {
    let (plain, mut pocket) = split_pocket(fen)?;
    pocket.push(piece);
    Ok(join_pocket(&plain, &pocket))
}

/// Put `piece` on the square at `file`/`rank` (both 0-based from a1) of a
/// FEN piece placement field.
pub fn place_piece(
    placement: &str,
    file: usize,
    rank: usize,
    piece: char,
) -> Result<String, FenError> {
    let invalid = || FenError::InvalidFormat(placement.to_string());
    let mut rows: Vec<Vec<char>> = placement
        .split('/')
        .map(|row| {
            row.chars()
                .flat_map(|c| match c.to_digit(10) {
                    Some(empty) => vec!['.'; empty as usize],
                    None => vec![c],
                })
                .collect()
        })
        .collect();
    if rows.len() != 8 || rows.iter().any(|row| row.len() != 8) || file > 7 || rank > 7 {
        return Err(invalid());
    }
    rows[7 - rank][file] = piece;

    let mut out = String::with_capacity(placement.len() + 1);
    for (idx, row) in rows.iter().enumerate() {
        if idx > 0 {
            out.push('/');
        }
        let mut empty = 0;
        for &cell in row {
            if cell == '.' {
                empty += 1;
                continue;
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
                empty = 0;
            }
            out.push(cell);
        }
        if empty > 0 {
            out.push_str(&empty.to_string());
        }
    }
    Ok(out)
}

/// Split the combined `fenA | fenB` string carried by board messages.
pub fn split_pair(combined: &str) -> Result<(String, String), FenError> {
    combined
        .split_once(PAIR_SEPARATOR)
        .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
        .ok_or_else(|| FenError::MissingPartner(combined.to_string()))
}

/// Parse the chess part of a bughouse FEN into a cozy-chess board.
pub fn parse_board(fen: &str) -> Result<(Board, String), FenError> {
    let (plain, pocket) = split_pocket(fen)?;
    let board = plain
        .parse::<Board>()
        .map_err(|_| FenError::InvalidPosition(plain.clone()))?;
    Ok((board, pocket))
}

/// Format a board plus pocket back into a bughouse FEN.
pub fn format_board(board: &Board, pocket: &str) -> String {
    join_pocket(&board.to_string(), pocket)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("Invalid FEN format: {0}")]
    InvalidFormat(String),
    #[error("Pocket is not terminated: {0}")]
    UnterminatedPocket(String),
    #[error("Board message FEN has no partner board: {0}")]
    MissingPartner(String),
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}
