//! Coordinate and algebraic move notation on top of cozy-chess.

use cozy_chess::{Board, File, GameStatus, Move, Piece, Rank, Square};

/// Convert UCI castling notation (king moves two squares) to the
/// king-captures-rook form cozy-chess uses, when that move is legal.
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    let is_back_rank = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    if !is_back_rank || !is_e_file || mv.promotion.is_some() {
        return mv;
    }

    let rook_file = match mv.to.file() {
        File::G => File::H,
        File::C => File::A,
        _ => return mv,
    };
    let converted = Move {
        from: mv.from,
        to: Square::new(rook_file, mv.from.rank()),
        promotion: None,
    };
    if legal_moves.contains(&converted) {
        converted
    } else {
        mv
    }
}

/// Inverse of [`convert_uci_castling_to_cozy`] for moves about to be shown
/// to the network or an engine.
pub fn convert_cozy_castling_to_uci(board: &Board, mv: Move) -> Move {
    if !is_castle(board, mv) {
        return mv;
    }
    let king_file = if mv.to.file() > mv.from.file() {
        File::G
    } else {
        File::C
    };
    Move {
        from: mv.from,
        to: Square::new(king_file, mv.from.rank()),
        promotion: None,
    }
}

fn is_castle(board: &Board, mv: Move) -> bool {
    board.piece_on(mv.from) == Some(Piece::King)
        && board.piece_on(mv.to) == Some(Piece::Rook)
        && board.color_on(mv.to) == board.color_on(mv.from)
}

/// Parse a coordinate move (`e2e4`, `e7e8q`). Drops are not coordinate moves.
pub fn parse_uci_move(text: &str) -> Option<Move> {
    if text.contains('@') {
        return None;
    }
    text.parse().ok()
}

/// Format a move in coordinate notation.
pub fn format_uci_move(mv: Move) -> String {
    let mut s = String::with_capacity(5);
    s.push(file_to_char(mv.from));
    s.push(rank_to_char(mv.from));
    s.push(file_to_char(mv.to));
    s.push(rank_to_char(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(piece_letter(promo).to_ascii_lowercase());
    }
    s
}

/// Standard algebraic notation for a legal move, including check and mate
/// suffixes.
pub fn generate_san(board: &Board, mv: Move) -> String {
    let Some(piece) = board.piece_on(mv.from) else {
        return format_uci_move(mv);
    };

    let mut san = String::new();
    if is_castle(board, mv) {
        san.push_str(if mv.to.file() > mv.from.file() {
            "O-O"
        } else {
            "O-O-O"
        });
    } else {
        let is_capture = is_capture(board, mv, piece);
        match piece {
            Piece::Pawn => {
                if is_capture {
                    san.push(file_to_char(mv.from));
                }
            }
            other => {
                san.push(piece_letter(other));
                san.push_str(&disambiguation(board, mv, other));
            }
        }
        if is_capture {
            san.push('x');
        }
        san.push(file_to_char(mv.to));
        san.push(rank_to_char(mv.to));
        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(piece_letter(promo));
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if !after.checkers().is_empty() {
        san.push(if after.status() == GameStatus::Won {
            '#'
        } else {
            '+'
        });
    }
    san
}

fn is_capture(board: &Board, mv: Move, piece: Piece) -> bool {
    let enemy = board.colors(!board.side_to_move());
    if enemy.has(mv.to) {
        return true;
    }
    // en passant: diagonal pawn move onto an empty square
    piece == Piece::Pawn && mv.from.file() != mv.to.file()
}

/// File and/or rank prefix needed when another piece of the same kind can
/// reach the same square.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let mut rivals = Vec::new();
    board.generate_moves(|moves| {
        for other in moves {
            if other.to == mv.to
                && other.from != mv.from
                && board.piece_on(other.from) == Some(piece)
            {
                rivals.push(other.from);
            }
        }
        false
    });
    if rivals.is_empty() {
        return String::new();
    }
    if rivals.iter().all(|sq| sq.file() != mv.from.file()) {
        return file_to_char(mv.from).to_string();
    }
    if rivals.iter().all(|sq| sq.rank() != mv.from.rank()) {
        return rank_to_char(mv.from).to_string();
    }
    format!("{}{}", file_to_char(mv.from), rank_to_char(mv.from))
}

/// All legal moves of the side to move, castling in cozy-chess form.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|mvs| {
        moves.extend(mvs);
        false
    });
    moves
}

pub fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::King => 'K',
        Piece::Queen => 'Q',
        Piece::Rook => 'R',
        Piece::Bishop => 'B',
        Piece::Knight => 'N',
        Piece::Pawn => 'P',
    }
}

pub fn file_to_char(square: Square) -> char {
    match square.file() {
        File::A => 'a',
        File::B => 'b',
        File::C => 'c',
        File::D => 'd',
        File::E => 'e',
        File::F => 'f',
        File::G => 'g',
        File::H => 'h',
    }
}

pub fn rank_to_char(square: Square) -> char {
    match square.rank() {
        Rank::First => '1',
        Rank::Second => '2',
        Rank::Third => '3',
        Rank::Fourth => '4',
        Rank::Fifth => '5',
        Rank::Sixth => '6',
        Rank::Seventh => '7',
        Rank::Eighth => '8',
    }
}

pub fn format_square(square: Square) -> String {
    let mut s = String::with_capacity(2);
    s.push(file_to_char(square));
    s.push(rank_to_char(square));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(fen: &str) -> Board {
        fen.parse().unwrap()
    }

    fn mv(text: &str) -> Move {
        parse_uci_move(text).unwrap()
    }

    #[test]
    fn test_format_uci_move() {
        assert_eq!(format_uci_move(mv("e2e4")), "e2e4");
        assert_eq!(format_uci_move(mv("e7e8q")), "e7e8q");
    }

    #[test]
    fn test_drops_are_not_coordinate_moves() {
        assert!(parse_uci_move("P@e4").is_none());
    }

    #[test]
    fn test_san_pawn_and_piece_moves() {
        let start = Board::default();
        assert_eq!(generate_san(&start, mv("e2e4")), "e4");
        assert_eq!(generate_san(&start, mv("g1f3")), "Nf3");
    }

    #[test]
    fn test_san_capture() {
        let b = board("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        assert_eq!(generate_san(&b, mv("e4d5")), "exd5");
    }

    #[test]
    fn test_san_castling_both_notations() {
        let b = board("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        let legal = legal_moves(&b);
        let short = convert_uci_castling_to_cozy(mv("e1g1"), &legal);
        assert_eq!(short, mv("e1h1"));
        assert_eq!(generate_san(&b, short), "O-O");
        let long = convert_uci_castling_to_cozy(mv("e1c1"), &legal);
        assert_eq!(generate_san(&b, long), "O-O-O");
        assert_eq!(convert_cozy_castling_to_uci(&b, short), mv("e1g1"));
    }

    #[test]
    fn test_san_check_and_mate() {
        let b = board("rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2");
        assert_eq!(generate_san(&b, mv("d8h4")), "Qh4#");
        let b = board("4k3/8/8/8/8/8/8/R3K3 w - - 0 1");
        assert_eq!(generate_san(&b, mv("a1a8")), "Ra8+");
    }

    #[test]
    fn test_san_disambiguation() {
        let b = board("4k3/8/8/8/8/8/4K3/R6R w - - 0 1");
        assert_eq!(generate_san(&b, mv("a1d1")), "Rad1");
        let b = board("4k3/8/8/8/8/8/8/N3K2N w - - 0 1");
        assert_eq!(generate_san(&b, mv("h1g3")), "Ng3");
    }
}
