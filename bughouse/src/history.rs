//! Ordered record of plies across both boards, with at most one open
//! analysis variation.

use enum_map::EnumMap;

use crate::analysis::EvaluationRecord;
use crate::step::Step;
use crate::types::{BoardId, PlyIndex, SessionMode};

/// Token for the currently open variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariationHandle {
    fork_ply: PlyIndex,
}

impl VariationHandle {
    /// Main-line ply the variation replaces.
    pub fn fork_ply(&self) -> PlyIndex {
        self.fork_ply
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationState {
    NoVariation,
    VariationOpen(PlyIndex),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Out of order append: expected ply {expected}, got {got}")]
    OutOfOrderAppend { expected: PlyIndex, got: PlyIndex },
    #[error("Invalid fork point {ply} (history has {len} plies)")]
    InvalidForkPoint { ply: PlyIndex, len: usize },
    #[error("No variation is open")]
    NoOpenVariation,
    #[error("Variations are only available in analysis sessions")]
    VariationsDisabled,
    #[error("History must contain an initial step")]
    EmptyHistory,
}

/// The step log of one game session.
///
/// `steps[0]` is the initial position; main-line step `i` is appended only
/// when `i` equals the current length. A variation at ply `p` is stored on
/// `steps[p]` and its entry `k` stands for global ply `p + k`.
#[derive(Debug, Clone)]
pub struct MoveHistory {
    mode: SessionMode,
    steps: Vec<Step>,
    open: Option<PlyIndex>,
}

impl MoveHistory {
    pub fn new(mode: SessionMode, initial: Step) -> Self {
        Self {
            mode,
            steps: vec![initial],
            open: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Number of main-line steps including the initial one.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true: the initial step is always present.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Ply of the last main-line step.
    pub fn last_ply(&self) -> PlyIndex {
        self.steps.len().saturating_sub(1)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, ply: PlyIndex) -> Option<&Step> {
        self.steps.get(ply)
    }

    pub fn initial(&self) -> &Step {
        &self.steps[0]
    }

    pub fn last(&self) -> &Step {
        &self.steps[self.last_ply()]
    }

    pub fn state(&self) -> VariationState {
        match self.open {
            Some(ply) => VariationState::VariationOpen(ply),
            None => VariationState::NoVariation,
        }
    }

    pub fn open_handle(&self) -> Option<VariationHandle> {
        self.open.map(|fork_ply| VariationHandle { fork_ply })
    }

    /// Append a step at ply `at`.
    ///
    /// With a variation open the step goes to the end of that variation
    /// and `at` is not checked.
    pub fn append(&mut self, at: PlyIndex, step: Step) -> Result<PlyIndex, HistoryError> {
        if let Some(handle) = self.open_handle() {
            return self.append_to_variation(handle, step);
        }
        let expected = self.steps.len();
        if at != expected {
            return Err(HistoryError::OutOfOrderAppend { expected, got: at });
        }
        self.steps.push(step);
        Ok(at)
    }

    /// Open (or reopen, emptied) the variation forking at main-line ply `at`.
    ///
    /// Any variation attached to another ply is detached.
    pub fn open_variation(&mut self, at: PlyIndex) -> Result<VariationHandle, HistoryError> {
        if !self.mode.supports_variations() {
            return Err(HistoryError::VariationsDisabled);
        }
        if at == 0 || at >= self.steps.len() {
            return Err(HistoryError::InvalidForkPoint {
                ply: at,
                len: self.steps.len(),
            });
        }
        for (ply, step) in self.steps.iter_mut().enumerate() {
            if ply != at {
                step.variation = None;
            }
        }
        self.steps[at].variation = Some(Vec::new());
        self.open = Some(at);
        Ok(VariationHandle { fork_ply: at })
    }

    pub fn append_to_variation(
        &mut self,
        handle: VariationHandle,
        step: Step,
    ) -> Result<PlyIndex, HistoryError> {
        let vari = self.open_variation_mut(handle)?;
        vari.push(step);
        Ok(handle.fork_ply + vari.len() - 1)
    }

    /// Keep only the first `keep` steps of the open variation.
    pub fn truncate_variation(
        &mut self,
        handle: VariationHandle,
        keep: usize,
    ) -> Result<(), HistoryError> {
        self.open_variation_mut(handle)?.truncate(keep);
        Ok(())
    }

    /// Clear the open-variation pointer. The variation stays attached.
    pub fn close_variation(&mut self) {
        self.open = None;
    }

    /// Remove the variation attached at `at`, closing it if it was open.
    pub fn detach_variation(&mut self, at: PlyIndex) -> Option<Vec<Step>> {
        if self.open == Some(at) {
            self.open = None;
        }
        self.steps.get_mut(at).and_then(|s| s.variation.take())
    }

    pub fn variation(&self, at: PlyIndex) -> Option<&[Step]> {
        self.steps.get(at)?.variation.as_deref()
    }

    /// Step shown for `ply`, following the open variation past its fork.
    pub fn step_at(&self, ply: PlyIndex, in_variation: bool) -> Option<&Step> {
        match self.open {
            Some(fork) if in_variation && ply >= fork => {
                self.variation(fork)?.get(ply - fork)
            }
            _ => self.steps.get(ply),
        }
    }

    /// Replace the whole main line, e.g. after a full resync.
    pub fn reset(&mut self, steps: Vec<Step>) -> Result<(), HistoryError> {
        if steps.is_empty() {
            return Err(HistoryError::EmptyHistory);
        }
        self.steps = steps;
        self.open = None;
        Ok(())
    }

    /// Store a primary evaluation on a main-line step.
    pub fn set_evaluation(&mut self, ply: PlyIndex, evaluation: EvaluationRecord) -> bool {
        match self.steps.get_mut(ply) {
            Some(step) => {
                step.evaluation = Some(evaluation);
                true
            }
            None => false,
        }
    }

    /// Latest main-line step played on `board`.
    pub fn last_step_for(&self, board: BoardId) -> Option<&Step> {
        self.steps.iter().rev().find(|s| s.board == Some(board))
    }

    /// Moves played on each board among main-line plies `1..=upto`.
    pub fn board_ply_counts(&self, upto: PlyIndex) -> EnumMap<BoardId, usize> {
        let mut counts = EnumMap::default();
        for step in self.steps.iter().take(upto + 1).skip(1) {
            if let Some(board) = step.board {
                counts[board] += 1;
            }
        }
        counts
    }

    fn open_variation_mut(
        &mut self,
        handle: VariationHandle,
    ) -> Result<&mut Vec<Step>, HistoryError> {
        if self.open != Some(handle.fork_ply) {
            return Err(HistoryError::NoOpenVariation);
        }
        self.steps
            .get_mut(handle.fork_ply)
            .and_then(|s| s.variation.as_mut())
            .ok_or(HistoryError::NoOpenVariation)
    }
}
