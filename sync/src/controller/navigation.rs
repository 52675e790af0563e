use std::time::Instant;

use bughouse::{BoardId, HistoryError};

use super::{Cursor, SyncController};
use crate::error::SyncError;
use crate::events::{Effect, RenderUpdate};

impl SyncController {
    /// Show `ply` on the main line or in the open variation.
    ///
    /// Targets past the end of the line are ignored. Returning to the main
    /// line discards the open variation.
    pub fn go_to_ply(
        &mut self,
        ply: usize,
        in_variation: bool,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        let open = self.history.open_handle();
        let target = match (in_variation, open) {
            (true, None) => return Err(HistoryError::NoOpenVariation.into()),
            (true, Some(handle)) if ply >= handle.fork_ply() => {
                let len = self
                    .history
                    .variation(handle.fork_ply())
                    .map_or(0, <[_]>::len);
                if ply - handle.fork_ply() >= len {
                    return Ok(Vec::new());
                }
                Cursor {
                    ply,
                    in_variation: true,
                }
            }
            _ => {
                if ply > self.history.last_ply() {
                    return Ok(Vec::new());
                }
                if let Some(handle) = open {
                    tracing::debug!(fork = handle.fork_ply(), "Leaving variation");
                    self.history.detach_variation(handle.fork_ply());
                }
                Cursor {
                    ply,
                    in_variation: false,
                }
            }
        };

        self.cursor = target;
        self.load_cursor_boards()?;
        let mut effects = self.render_boards();
        if let Some(step) = self.history.step_at(target.ply, target.in_variation) {
            let shown: Vec<(BoardId, bughouse::Clocks)> = BoardId::ALL
                .iter()
                .filter_map(|&b| step.clocks_for(b).map(|c| (b, c)))
                .collect();
            let evaluation = step.evaluation.clone();
            let mut clocks_changed = false;
            for (board, clocks) in shown {
                clocks_changed |= self.clocks.set_display(board, clocks, now);
            }
            if clocks_changed {
                effects.push(self.render_clocks(now));
            }
            if let Some(view) = evaluation.and_then(|record| self.evaluation_view(record)) {
                effects.push(Effect::Render(RenderUpdate::Evaluation(view)));
            }
        }
        effects.push(self.render_move_list());
        effects.extend(self.restart_analysis());
        Ok(effects)
    }

    /// Jump to the first ply of the open variation.
    pub fn enter_variation(&mut self, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let handle = self
            .history
            .open_handle()
            .ok_or(HistoryError::NoOpenVariation)?;
        self.go_to_ply(handle.fork_ply(), true, now)
    }

    /// Back to the main-line ply the variation forks from.
    pub fn exit_variation(&mut self, now: Instant) -> Result<Vec<Effect>, SyncError> {
        let handle = self
            .history
            .open_handle()
            .ok_or(HistoryError::NoOpenVariation)?;
        self.go_to_ply(handle.fork_ply() - 1, false, now)
    }

    /// Move the cursor to the latest confirmed ply. Returns false when it
    /// was already there.
    pub(super) fn follow_latest(&mut self) -> Result<bool, SyncError> {
        if self.at_latest() {
            return Ok(false);
        }
        self.cursor = Cursor {
            ply: self.history.last_ply(),
            in_variation: false,
        };
        self.load_cursor_boards()?;
        Ok(true)
    }

    /// Load both displayed boards from the step under the cursor.
    pub(super) fn load_cursor_boards(&mut self) -> Result<(), SyncError> {
        let Cursor { ply, in_variation } = self.cursor;
        let step = self
            .history
            .step_at(ply, in_variation)
            .cloned()
            .ok_or_else(|| SyncError::Internal(format!("No step at ply {ply}")))?;
        for board in BoardId::ALL {
            let fen = step.fen_for(board);
            if fen.is_empty() {
                continue;
            }
            let last_move = step.move_for(board).map(str::to_string);
            self.boards[board].load(fen, last_move)?;
        }
        Ok(())
    }
}
