//! Own moves sent but not yet confirmed, kept for replay after a reconnect.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{BoardId, Clocks, PlyIndex};

/// An own move awaiting board confirmation, in its outbound wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMove {
    pub board: BoardId,
    #[serde(rename = "move")]
    pub mv: String,
    pub clocks: Clocks,
    pub clocks_b: Clocks,
    pub ply: PlyIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Reconnect flush pending; new moves are not accepted yet")]
    FlushPending,
}

/// At most one pending move per board, ordered by send time.
#[derive(Debug, Clone, Default)]
pub struct ReconnectMoveQueue {
    entries: SmallVec<[PendingMove; 2]>,
    awaiting_flush: bool,
}

impl ReconnectMoveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a move just sent.
    ///
    /// An older entry for the same board is dropped and the new one goes to
    /// the back, so the other board's entry keeps its relative position.
    pub fn record_own_move(&mut self, mv: PendingMove) -> Result<(), QueueError> {
        if self.awaiting_flush {
            return Err(QueueError::FlushPending);
        }
        self.entries.retain(|e| e.board != mv.board);
        self.entries.push(mv);
        Ok(())
    }

    /// The socket dropped; block new moves until the next flush.
    pub fn mark_disconnected(&mut self) {
        self.awaiting_flush = true;
    }

    pub fn is_awaiting_flush(&self) -> bool {
        self.awaiting_flush
    }

    /// Moves to resend after a reconnect, oldest first.
    ///
    /// Entries stay queued until acknowledged; the server applies a
    /// duplicate at most once.
    pub fn flush_on_reconnect(&mut self) -> Vec<PendingMove> {
        self.awaiting_flush = false;
        self.entries.to_vec()
    }

    /// Drop the entry for `board` once the server confirmed it.
    pub fn acknowledge(&mut self, board: BoardId) -> Option<PendingMove> {
        let idx = self.entries.iter().position(|e| e.board == board)?;
        Some(self.entries.remove(idx))
    }

    pub fn pending_for(&self, board: BoardId) -> Option<&PendingMove> {
        self.entries.iter().find(|e| e.board == board)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMove> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pending(board: BoardId, mv: &str, ply: PlyIndex) -> PendingMove {
        PendingMove {
            board,
            mv: mv.to_string(),
            clocks: Clocks::new(60_000, 60_000),
            clocks_b: Clocks::new(60_000, 60_000),
            ply,
        }
    }

    fn boards(q: &[PendingMove]) -> Vec<(BoardId, &str)> {
        q.iter().map(|p| (p.board, p.mv.as_str())).collect()
    }

    #[test]
    fn test_a_b_a_keeps_b_then_latest_a() {
        let mut q = ReconnectMoveQueue::new();
        q.record_own_move(pending(BoardId::A, "e2e4", 1)).unwrap();
        q.record_own_move(pending(BoardId::B, "d7d5", 2)).unwrap();
        q.record_own_move(pending(BoardId::A, "g1f3", 3)).unwrap();
        q.mark_disconnected();
        let flushed = q.flush_on_reconnect();
        assert_eq!(
            boards(&flushed),
            vec![(BoardId::B, "d7d5"), (BoardId::A, "g1f3")]
        );
    }

    #[test]
    fn test_same_board_overwrites_single_entry() {
        let mut q = ReconnectMoveQueue::new();
        q.record_own_move(pending(BoardId::A, "e2e4", 1)).unwrap();
        q.record_own_move(pending(BoardId::A, "d2d4", 3)).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pending_for(BoardId::A).map(|p| p.ply), Some(3));
    }

    #[test]
    fn test_flush_blocks_new_moves_until_called() {
        let mut q = ReconnectMoveQueue::new();
        q.record_own_move(pending(BoardId::A, "e2e4", 1)).unwrap();
        q.mark_disconnected();
        assert_eq!(
            q.record_own_move(pending(BoardId::B, "d2d4", 2)),
            Err(QueueError::FlushPending)
        );
        assert_eq!(q.flush_on_reconnect().len(), 1);
        assert!(q.record_own_move(pending(BoardId::B, "d2d4", 2)).is_ok());
    }

    #[test]
    fn test_acknowledge_leaves_other_board() {
        let mut q = ReconnectMoveQueue::new();
        q.record_own_move(pending(BoardId::A, "e2e4", 1)).unwrap();
        q.record_own_move(pending(BoardId::B, "d2d4", 2)).unwrap();
        assert_eq!(q.acknowledge(BoardId::A).map(|p| p.ply), Some(1));
        assert_eq!(q.acknowledge(BoardId::A), None);
        assert_eq!(boards(&q.flush_on_reconnect()), vec![(BoardId::B, "d2d4")]);
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(pending(BoardId::B, "e2e4", 7)).unwrap();
        assert_eq!(json["move"], "e2e4");
        assert_eq!(json["board"], "b");
        assert_eq!(json["clocksB"], serde_json::json!([60000, 60000]));
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_board_in_send_order(seq in prop::collection::vec(any::<bool>(), 1..30)) {
            let mut q = ReconnectMoveQueue::new();
            let mut last_sent = Vec::new();
            for (ply, is_a) in seq.iter().enumerate() {
                let board = if *is_a { BoardId::A } else { BoardId::B };
                q.record_own_move(pending(board, "e2e4", ply)).unwrap();
                last_sent.retain(|(b, _)| *b != board);
                last_sent.push((board, ply));
            }
            prop_assert!(q.len() <= 2);
            let got: Vec<_> = q.iter().map(|p| (p.board, p.ply)).collect();
            prop_assert_eq!(got, last_sent);
        }
    }
}
