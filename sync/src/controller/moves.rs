use std::time::Instant;

use bughouse::fen;
use bughouse::{
    BoardId, HistoryError, MoveOutcome, PendingMove, QueueError, RulesError, SessionMode, Step,
};

use super::{Cursor, SyncController};
use crate::error::SyncError;
use crate::events::Effect;
use crate::messages::{MoveMessage, OutboundMessage};

impl SyncController {
    /// Play a move for the local user.
    ///
    /// In a live game the move is applied optimistically, queued for replay
    /// and sent to the server. In analysis it extends the line being viewed.
    pub fn submit_move(
        &mut self,
        board: BoardId,
        mv: &str,
        premove: bool,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        if self.setup.mode == SessionMode::Analysis {
            return self.analysis_move(board, mv);
        }
        if self.status.is_terminal() {
            return Err(SyncError::GameOver);
        }
        let color = self
            .setup
            .my_color(board)
            .ok_or(SyncError::NotYourBoard(board))?;
        if !self.connected {
            return Err(SyncError::Disconnected);
        }
        if self.queue.is_awaiting_flush() {
            return Err(QueueError::FlushPending.into());
        }
        if self.live_turns[board] != color {
            return Err(SyncError::NotYourTurn(board));
        }

        // Moves are played on the live position; put the view back if the
        // move does not apply there.
        let viewed = self.cursor;
        let followed = self.follow_latest()?;
        let outcome = match self.play_on(board, mv) {
            Ok(outcome) => outcome,
            Err(err) => {
                if followed {
                    self.cursor = viewed;
                    self.load_cursor_boards()?;
                }
                return Err(err);
            }
        };
        let mut effects = Vec::new();
        if followed {
            effects.push(self.render_move_list());
            effects.extend(self.render_boards());
        }

        let state = &mut self.boards[board];
        state.last_move = Some(outcome.uci.clone());
        state.turn = color.opposite();
        state.check = outcome.is_check;
        self.live_turns[board] = color.opposite();

        let clocks = self.clocks.on_local_submit(board, color, premove, now);
        let pending = PendingMove {
            board,
            mv: outcome.uci,
            clocks: clocks[BoardId::A],
            clocks_b: clocks[BoardId::B],
            ply: self.ply.map_or(self.history.len(), |p| p + 1),
        };
        tracing::info!(board = %board, mv = %pending.mv, ply = pending.ply, premove, "Sending move");
        self.queue.record_own_move(pending.clone())?;

        effects.push(self.send(OutboundMessage::Move(MoveMessage::from_pending(
            &self.setup.game_id,
            &pending,
        ))));
        effects.push(self.render_board(board));
        effects.push(self.render_clocks(now));
        Ok(effects)
    }

    /// Queue a move to play as soon as it is the local player's turn, or
    /// play it right away when it already is.
    pub fn set_premove(
        &mut self,
        board: BoardId,
        mv: &str,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        if self.setup.mode == SessionMode::Analysis {
            return self.analysis_move(board, mv);
        }
        if self.status.is_terminal() {
            return Err(SyncError::GameOver);
        }
        let color = self
            .setup
            .my_color(board)
            .ok_or(SyncError::NotYourBoard(board))?;
        if self.live_turns[board] == color {
            return self.submit_move(board, mv, false, now);
        }
        tracing::debug!(board = %board, mv, "Premove set");
        self.boards[board].premove = Some(mv.to_string());
        Ok(vec![self.render_board(board)])
    }

    pub fn cancel_premove(&mut self, board: BoardId) -> Vec<Effect> {
        match self.boards[board].premove.take() {
            Some(_) => vec![self.render_board(board)],
            None => Vec::new(),
        }
    }

    /// Play the stored premove on `board` if it is now the local player's turn.
    pub(super) fn play_premove(&mut self, board: BoardId, now: Instant) -> Vec<Effect> {
        let Some(color) = self.setup.my_color(board) else {
            return Vec::new();
        };
        if self.live_turns[board] != color {
            return Vec::new();
        }
        let Some(mv) = self.boards[board].premove.take() else {
            return Vec::new();
        };
        match self.submit_move(board, &mv, true, now) {
            Ok(effects) => effects,
            Err(err) => {
                tracing::debug!(board = %board, mv = %mv, "Dropping premove: {}", err);
                vec![self.render_board(board)]
            }
        }
    }

    /// Apply `mv` to the displayed `board`. With auto-promotion on, a bare
    /// coordinate move that is only legal as a promotion becomes a queen.
    fn play_on(&mut self, board: BoardId, mv: &str) -> Result<MoveOutcome, SyncError> {
        let rules = &mut self.boards[board].rules;
        match rules.apply_move(mv) {
            Err(RulesError::IllegalMove(_))
                if self.config.auto_promote && is_bare_coordinate(mv) =>
            {
                let promoted = format!("{mv}q");
                tracing::debug!(board = %board, mv, "Auto-promoting to queen");
                rules
                    .apply_move(&promoted)
                    .map_err(|_| RulesError::IllegalMove(mv.to_string()).into())
            }
            other => Ok(other?),
        }
    }

    /// Extend the analysis tree from the viewed ply.
    ///
    /// Replaying the move that already follows just moves the cursor.
    /// A different move at a main-line ply opens a variation there; inside
    /// the variation it replaces everything after the cursor.
    fn analysis_move(&mut self, board: BoardId, mv: &str) -> Result<Vec<Effect>, SyncError> {
        let Cursor { ply, in_variation } = self.cursor;
        let current = self
            .history
            .step_at(ply, in_variation)
            .cloned()
            .ok_or_else(|| SyncError::Internal(format!("No step at ply {ply}")))?;

        self.boards[board].load(
            current.fen_for(board),
            current.move_for(board).map(str::to_string),
        )?;
        let mover = self.boards[board].turn;
        let outcome = self.play_on(board, mv)?;

        let mut step = Step {
            fen: current.fen.clone(),
            fen_b: current.fen_b.clone(),
            move_a: current.move_a.clone(),
            move_b: current.move_b.clone(),
            check: outcome.is_check,
            turn_color: mover.opposite(),
            san: Some(outcome.san.clone()),
            board: Some(board),
            captured: outcome.captured,
            ..Default::default()
        };
        step.set_fen(board, outcome.fen.clone());
        step.set_move(board, Some(outcome.uci.clone()));
        if let Some(piece) = outcome.captured {
            let partner = board.partner();
            step.set_fen(partner, fen::add_to_pocket(current.fen_for(partner), piece)?);
        }

        let next = ply + 1;
        let target = if in_variation {
            let handle = self
                .history
                .open_handle()
                .ok_or(HistoryError::NoOpenVariation)?;
            let idx = ply - handle.fork_ply();
            let repeats = self
                .history
                .variation(handle.fork_ply())
                .and_then(|v| v.get(idx + 1))
                .is_some_and(|s| s.is_move(board, &outcome.uci));
            if !repeats {
                self.history.truncate_variation(handle, idx + 1)?;
                self.history.append_to_variation(handle, step)?;
            }
            Cursor {
                ply: next,
                in_variation: true,
            }
        } else if next == self.history.len() {
            self.history.close_variation();
            self.history.append(next, step)?;
            Cursor {
                ply: next,
                in_variation: false,
            }
        } else if self
            .history
            .step(next)
            .is_some_and(|s| s.is_move(board, &outcome.uci))
        {
            Cursor {
                ply: next,
                in_variation: false,
            }
        } else {
            let handle = self.history.open_variation(next)?;
            self.history.append_to_variation(handle, step)?;
            Cursor {
                ply: next,
                in_variation: true,
            }
        };
        tracing::debug!(board = %board, san = %outcome.san, ply = next, in_variation = target.in_variation, "Analysis move");

        self.cursor = target;
        self.load_cursor_boards()?;
        let mut effects = self.render_boards();
        effects.push(self.render_move_list());
        effects.extend(self.restart_analysis());
        Ok(effects)
    }
}

/// `e7e8` rather than `e7e8q` or a drop.
fn is_bare_coordinate(mv: &str) -> bool {
    mv.len() == 4 && mv.chars().all(|c| c.is_ascii_alphanumeric())
}
