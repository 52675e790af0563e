//! Reconciliation of server board messages with local state.

use std::time::Instant;

use bughouse::fen;
use bughouse::{BoardId, Clocks, GameStatus, MoveOrigin};
use enum_map::EnumMap;

use super::{Cursor, SyncController};
use crate::error::SyncError;
use crate::events::Effect;
use crate::messages::BoardMessage;

/// How a board message relates to the local ply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Freshness {
    Latest,
    Stale,
    Gap,
}

impl SyncController {
    pub(super) fn classify(&self, msg: &BoardMessage) -> Freshness {
        let Some(local) = self.ply else {
            return Freshness::Latest;
        };
        if msg.is_initial() {
            return if local == 0 {
                Freshness::Latest
            } else {
                Freshness::Stale
            };
        }
        if msg.is_full() {
            return if msg.ply >= local {
                Freshness::Latest
            } else {
                Freshness::Stale
            };
        }
        match msg.ply.cmp(&(local + 1)) {
            std::cmp::Ordering::Equal => Freshness::Latest,
            std::cmp::Ordering::Less => Freshness::Stale,
            std::cmp::Ordering::Greater => Freshness::Gap,
        }
    }

    pub(super) fn on_board_message(
        &mut self,
        msg: BoardMessage,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        match self.classify(&msg) {
            Freshness::Stale => {
                tracing::warn!(local = ?self.ply, got = msg.ply, "Ignoring stale board message");
                return Ok(Vec::new());
            }
            Freshness::Gap => {
                return Err(SyncError::ReconcileGapTooLarge {
                    local: self.ply,
                    got: msg.ply,
                });
            }
            Freshness::Latest => {}
        }

        let status = msg.status;
        let result = msg.result.clone();
        let mut effects = if msg.is_initial() || msg.is_full() {
            self.apply_snapshot(msg, now)?
        } else {
            self.apply_single_ply(msg, now)?
        };
        effects.extend(self.update_status(status, result, now));

        if !self.status.is_terminal() {
            for board in BoardId::ALL {
                effects.extend(self.play_premove(board, now));
            }
        }
        effects.extend(self.restart_analysis());
        Ok(effects)
    }

    /// Replace everything with an authoritative snapshot.
    fn apply_snapshot(&mut self, msg: BoardMessage, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let (fen_a, fen_b) = fen::split_pair(&msg.fen)?;
        let sent_clocks: EnumMap<BoardId, Option<Clocks>> =
            EnumMap::from_fn(|board| msg.clocks_for(board));
        tracing::info!(ply = msg.ply, steps = msg.steps.len(), "Applying board snapshot");
        self.history.reset(msg.steps)?;
        if self.history.last_ply() != msg.ply {
            tracing::warn!(
                ply = msg.ply,
                last = self.history.last_ply(),
                "Snapshot ply does not match its steps"
            );
        }
        self.ply = Some(msg.ply);

        for (board, fen) in [(BoardId::A, fen_a), (BoardId::B, fen_b)] {
            let last_move = self
                .history
                .last_step_for(board)
                .and_then(|s| s.move_for(board))
                .map(str::to_string);
            self.boards[board].load(&fen, last_move)?;
            self.live_turns[board] = self.boards[board].turn;
        }

        let clocks: EnumMap<BoardId, Clocks> = EnumMap::from_fn(|board| {
            sent_clocks[board]
                .or_else(|| self.history.last_step_for(board).and_then(|s| s.clocks_for(board)))
                .unwrap_or_else(|| self.clocks.confirmed(board))
        });
        self.clocks.on_full_resync(self.live_turns, clocks, msg.status, now);
        self.acknowledge_confirmed();

        self.cursor = Cursor {
            ply: self.history.last_ply(),
            in_variation: false,
        };
        let mut effects = self.render_boards();
        effects.push(self.render_clocks(now));
        effects.push(self.render_move_list());
        Ok(effects)
    }

    /// Drop queued moves that already appear in the history.
    fn acknowledge_confirmed(&mut self) {
        let confirmed: Vec<BoardId> = self
            .queue
            .iter()
            .filter(|pending| {
                self.history
                    .steps()
                    .iter()
                    .skip(pending.ply)
                    .any(|s| s.is_move(pending.board, &pending.mv))
            })
            .map(|pending| pending.board)
            .collect();
        for board in confirmed {
            if let Some(pending) = self.queue.acknowledge(board) {
                tracing::debug!(board = %board, mv = %pending.mv, "Queued move confirmed by snapshot");
            }
        }
    }

    fn apply_single_ply(
        &mut self,
        msg: BoardMessage,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        let Some(step) = msg.steps.first().cloned() else {
            tracing::warn!(ply = msg.ply, "Board message without steps");
            return Ok(Vec::new());
        };
        let Some((board, mover)) = step.mover() else {
            return Ok(Vec::new());
        };
        if self.history.len() != msg.ply {
            return Err(SyncError::ReconcileGapTooLarge {
                local: self.ply,
                got: msg.ply,
            });
        }

        let following = self.at_latest();
        self.history.close_variation();
        self.history.append(msg.ply, step.clone())?;
        self.ply = Some(msg.ply);
        self.live_turns[board] = step.turn_color;

        if following {
            let (fen_a, fen_b) = fen::split_pair(&msg.fen)?;
            let partner = board.partner();
            let mut fens = EnumMap::from_array([fen_a, fen_b]);
            self.boards[board].load(&fens[board], step.move_for(board).map(str::to_string))?;
            let partner_move = self.boards[partner].last_move.take();
            self.boards[partner].load(&std::mem::take(&mut fens[partner]), partner_move)?;
            self.cursor = Cursor {
                ply: msg.ply,
                in_variation: false,
            };
        }

        let mine = self.setup.my_color(board) == Some(mover);
        let origin = if mine {
            MoveOrigin::Local
        } else {
            MoveOrigin::Remote
        };
        let server_clocks = msg
            .clocks_for(board)
            .or_else(|| step.clocks_for(board))
            .unwrap_or_else(|| self.clocks.confirmed(board));
        self.clocks
            .on_move_confirmed(board, mover, server_clocks, origin, msg.status, now);
        if mine {
            if let Some(pending) = self.queue.acknowledge(board) {
                tracing::debug!(board = %board, mv = %pending.mv, "Own move confirmed");
            }
        }
        tracing::debug!(
            board = %board,
            ply = msg.ply,
            color = %mover,
            san = step.san.as_deref().unwrap_or("?"),
            "Move confirmed"
        );

        let mut effects = Vec::new();
        if following {
            effects.extend(self.render_boards());
        }
        effects.push(self.render_clocks(now));
        effects.push(self.render_move_list());
        Ok(effects)
    }

    /// Record a status change and stop the game once it is terminal.
    pub(super) fn update_status(
        &mut self,
        status: GameStatus,
        result: String,
        now: Instant,
    ) -> Vec<Effect> {
        if status == self.status && result == self.result {
            return Vec::new();
        }
        self.status = status;
        self.result = result;
        self.finish_if_terminal(now)
    }
}
