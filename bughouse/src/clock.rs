//! Four game clocks (two per board) and the rules deciding when they start,
//! stop and get overwritten.
//!
//! Every operation takes the current `Instant` explicitly so callers (and
//! tests) control time.

use std::time::Instant;

use enum_map::EnumMap;

use crate::types::{BoardId, Clocks, Color, GameStatus, SessionMode};

/// Both clocks of one board. At most one side runs at a time.
#[derive(Debug, Clone)]
pub struct BoardTimer {
    remaining_ms: EnumMap<Color, u64>,
    active_side: Option<Color>,
    last_tick: Instant,
    last_set: Option<Instant>,
}

impl BoardTimer {
    pub fn new(base_ms: u64, now: Instant) -> Self {
        Self {
            remaining_ms: EnumMap::from_fn(|_| base_ms),
            active_side: None,
            last_tick: now,
            last_set: None,
        }
    }

    /// Deduct time elapsed since the last tick from the running side.
    /// Returns true if that side's flag has fallen.
    pub fn tick(&mut self, now: Instant) -> bool {
        let elapsed_ms = now.saturating_duration_since(self.last_tick).as_millis() as u64;
        self.last_tick = now;
        match self.active_side {
            Some(side) => {
                let left = self.remaining_ms[side].saturating_sub(elapsed_ms);
                self.remaining_ms[side] = left;
                left == 0
            }
            None => false,
        }
    }

    pub fn start(&mut self, side: Color, now: Instant) {
        self.tick(now);
        self.active_side = Some(side);
    }

    pub fn stop(&mut self, now: Instant) {
        self.tick(now);
        self.active_side = None;
    }

    /// Overwrite both values. A running side keeps running from the new value.
    pub fn set(&mut self, clocks: Clocks, now: Instant) {
        self.tick(now);
        self.remaining_ms[Color::White] = clocks.white;
        self.remaining_ms[Color::Black] = clocks.black;
        self.last_set = Some(now);
    }

    fn set_side(&mut self, side: Color, ms: u64, now: Instant) {
        self.tick(now);
        self.remaining_ms[side] = ms;
        self.last_set = Some(now);
    }

    /// Remaining time of `side` as of `now`, without mutating the timer.
    pub fn remaining_at(&self, side: Color, now: Instant) -> u64 {
        let stored = self.remaining_ms[side];
        if self.active_side == Some(side) {
            let elapsed = now.saturating_duration_since(self.last_tick).as_millis() as u64;
            stored.saturating_sub(elapsed)
        } else {
            stored
        }
    }

    pub fn clocks_at(&self, now: Instant) -> Clocks {
        Clocks::new(
            self.remaining_at(Color::White, now),
            self.remaining_at(Color::Black, now),
        )
    }

    pub fn active_side(&self) -> Option<Color> {
        self.active_side
    }

    pub fn last_set(&self) -> Option<Instant> {
        self.last_set
    }
}

/// Who produced a confirmed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOrigin {
    /// The local player; clocks were already switched at submission.
    Local,
    /// Anyone else; the server snapshot is authoritative.
    Remote,
}

/// What the renderer shows for one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ClockReading {
    pub remaining_ms: u64,
    pub running: bool,
}

/// Owns the four clocks of a session.
#[derive(Debug, Clone)]
pub struct ClockReconciler {
    mode: SessionMode,
    increment_ms: u64,
    boards: EnumMap<BoardId, BoardTimer>,
    /// Last server-confirmed values per board.
    confirmed: EnumMap<BoardId, Clocks>,
    terminal: bool,
    flag_reported: bool,
    /// Off for untimed display: values are kept but nothing runs.
    clock_on: bool,
}

impl ClockReconciler {
    pub fn new(mode: SessionMode, base_ms: u64, increment_ms: u64, now: Instant) -> Self {
        Self {
            mode,
            increment_ms,
            boards: EnumMap::from_fn(|_| BoardTimer::new(base_ms, now)),
            confirmed: EnumMap::from_fn(|_| Clocks::new(base_ms, base_ms)),
            terminal: false,
            flag_reported: false,
            clock_on: true,
        }
    }

    pub fn with_clock_on(mut self, clock_on: bool) -> Self {
        self.clock_on = clock_on;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn timer(&self, board: BoardId) -> &BoardTimer {
        &self.boards[board]
    }

    pub fn confirmed(&self, board: BoardId) -> Clocks {
        self.confirmed[board]
    }

    /// Run `color`'s clock on `board`, stopping its opponent first.
    /// Ignored once the game is over and in analysis sessions.
    pub fn start(&mut self, board: BoardId, color: Color, now: Instant) {
        if self.terminal || !self.clock_on || !self.mode.clocks_tick() {
            return;
        }
        self.boards[board].start(color, now);
    }

    /// Apply a board-confirmed move.
    ///
    /// Remote moves stop the mover, take `server_clocks` for both colors and
    /// start the opponent. Local moves keep the clocks switched at submission
    /// and only record the confirmed values.
    pub fn on_move_confirmed(
        &mut self,
        board: BoardId,
        mover: Color,
        server_clocks: Clocks,
        origin: MoveOrigin,
        status: GameStatus,
        now: Instant,
    ) {
        self.confirmed[board] = server_clocks;
        if status.is_terminal() {
            self.boards[board].set(server_clocks, now);
            self.on_game_end(now);
            return;
        }
        match origin {
            MoveOrigin::Remote => {
                let timer = &mut self.boards[board];
                timer.stop(now);
                timer.set(server_clocks, now);
                self.start(board, mover.opposite(), now);
            }
            MoveOrigin::Local => {
                if self.boards[board].active_side() != Some(mover.opposite()) {
                    self.start(board, mover.opposite(), now);
                }
            }
        }
    }

    /// Stop the mover's clock for a locally submitted move and compute the
    /// clock values sent along with it.
    ///
    /// The increment is added exactly once. A pre-move consumed no thinking
    /// time, so its value is the last confirmed time plus the increment.
    pub fn on_local_submit(
        &mut self,
        board: BoardId,
        mover: Color,
        premove: bool,
        now: Instant,
    ) -> EnumMap<BoardId, Clocks> {
        let timer = &mut self.boards[board];
        timer.stop(now);
        let spent_from = if premove {
            self.confirmed[board].get(mover)
        } else {
            timer.remaining_at(mover, now)
        };
        timer.set_side(mover, spent_from + self.increment_ms, now);
        self.start(board, mover.opposite(), now);
        EnumMap::from_fn(|b: BoardId| self.boards[b].clocks_at(now))
    }

    /// Reset all four clocks from an authoritative snapshot and run the side
    /// to move on each board if the game is still live.
    pub fn on_full_resync(
        &mut self,
        turns: EnumMap<BoardId, Color>,
        clocks: EnumMap<BoardId, Clocks>,
        status: GameStatus,
        now: Instant,
    ) {
        for board in BoardId::ALL {
            let timer = &mut self.boards[board];
            timer.stop(now);
            timer.set(clocks[board], now);
            self.confirmed[board] = clocks[board];
        }
        if status.is_terminal() {
            self.on_game_end(now);
            return;
        }
        for board in BoardId::ALL {
            self.start(board, turns[board], now);
        }
    }

    /// Stop every clock for good.
    pub fn on_game_end(&mut self, now: Instant) {
        for board in BoardId::ALL {
            self.boards[board].stop(now);
        }
        self.terminal = true;
    }

    /// Decide whether a time-out reported by the external ticker counts.
    ///
    /// Only the side actually on move can flag, and only once per session.
    pub fn on_flag(&mut self, board: BoardId, color: Color, side_to_move: Color) -> bool {
        if self.flag_reported || self.terminal || !self.clock_on || color != side_to_move {
            return false;
        }
        if self.boards[board].active_side() != Some(color) && self.mode.clocks_tick() {
            return false;
        }
        self.flag_reported = true;
        true
    }

    /// Show a recorded snapshot on a board whose clocks are not running.
    pub fn set_display(&mut self, board: BoardId, clocks: Clocks, now: Instant) -> bool {
        let timer = &mut self.boards[board];
        if timer.active_side().is_some() {
            return false;
        }
        timer.set(clocks, now);
        true
    }

    pub fn views(&self, now: Instant) -> EnumMap<BoardId, EnumMap<Color, ClockReading>> {
        EnumMap::from_fn(|board: BoardId| {
            let timer = &self.boards[board];
            EnumMap::from_fn(|color: Color| ClockReading {
                remaining_ms: timer.remaining_at(color, now),
                running: timer.active_side() == Some(color),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MIN: u64 = 60_000;

    fn live(now: Instant) -> ClockReconciler {
        ClockReconciler::new(SessionMode::Live, MIN, 2_000, now)
    }

    fn running(c: &ClockReconciler, board: BoardId) -> Option<Color> {
        c.timer(board).active_side()
    }

    #[test]
    fn test_timer_tick_and_flag() {
        let t0 = Instant::now();
        let mut timer = BoardTimer::new(1_000, t0);
        timer.start(Color::White, t0);
        assert_eq!(timer.remaining_at(Color::White, t0 + Duration::from_millis(400)), 600);
        assert!(!timer.tick(t0 + Duration::from_millis(500)));
        assert!(timer.tick(t0 + Duration::from_millis(1_500)));
        assert_eq!(timer.remaining_at(Color::Black, t0), 1_000);
    }

    #[test]
    fn test_start_switches_sides() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.start(BoardId::A, Color::White, t0);
        c.start(BoardId::A, Color::Black, t0 + Duration::from_secs(1));
        let views = c.views(t0 + Duration::from_secs(3));
        assert_eq!(views[BoardId::A][Color::White].remaining_ms, MIN - 1_000);
        assert!(!views[BoardId::A][Color::White].running);
        assert_eq!(views[BoardId::A][Color::Black].remaining_ms, MIN - 2_000);
        assert!(views[BoardId::A][Color::Black].running);
    }

    #[test]
    fn test_remote_confirmation_resyncs_only_that_board() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.start(BoardId::A, Color::White, t0);
        c.start(BoardId::B, Color::White, t0);
        let later = t0 + Duration::from_secs(2);
        c.on_move_confirmed(
            BoardId::A,
            Color::White,
            Clocks::new(58_000, 60_000),
            MoveOrigin::Remote,
            GameStatus::Started,
            later,
        );
        assert_eq!(running(&c, BoardId::A), Some(Color::Black));
        assert_eq!(c.timer(BoardId::A).remaining_at(Color::White, later), 58_000);
        assert_eq!(running(&c, BoardId::B), Some(Color::White));
        assert_eq!(c.timer(BoardId::B).remaining_at(Color::White, later), MIN - 2_000);
    }

    #[test]
    fn test_local_submit_adds_increment_once() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.start(BoardId::A, Color::White, t0);
        let sent = c.on_local_submit(BoardId::A, Color::White, false, t0 + Duration::from_secs(5));
        assert_eq!(sent[BoardId::A], Clocks::new(MIN - 5_000 + 2_000, MIN));
        assert_eq!(sent[BoardId::B], Clocks::new(MIN, MIN));
        assert_eq!(running(&c, BoardId::A), Some(Color::Black));

        // confirmation of our own move does not re-apply anything
        let t1 = t0 + Duration::from_secs(6);
        c.on_move_confirmed(
            BoardId::A,
            Color::White,
            sent[BoardId::A],
            MoveOrigin::Local,
            GameStatus::Started,
            t1,
        );
        assert_eq!(c.timer(BoardId::A).remaining_at(Color::White, t1), MIN - 3_000);
        assert_eq!(c.timer(BoardId::A).remaining_at(Color::Black, t1), MIN - 1_000);
    }

    #[test]
    fn test_premove_uses_confirmed_time() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.on_full_resync(
            EnumMap::from_fn(|_| Color::White),
            EnumMap::from_fn(|_| Clocks::new(30_000, 40_000)),
            GameStatus::Started,
            t0,
        );
        let sent = c.on_local_submit(BoardId::B, Color::White, true, t0 + Duration::from_secs(3));
        assert_eq!(sent[BoardId::B].white, 32_000);
    }

    #[test]
    fn test_full_resync_runs_side_to_move_only_when_live() {
        let t0 = Instant::now();
        let mut c = live(t0);
        let turns = EnumMap::from_fn(|b| match b {
            BoardId::A => Color::Black,
            BoardId::B => Color::White,
        });
        c.on_full_resync(turns, EnumMap::default(), GameStatus::Started, t0);
        assert_eq!(running(&c, BoardId::A), Some(Color::Black));
        assert_eq!(running(&c, BoardId::B), Some(Color::White));

        let mut ended = live(t0);
        ended.on_full_resync(turns, EnumMap::default(), GameStatus::Mate, t0);
        assert_eq!(running(&ended, BoardId::A), None);
        assert!(ended.is_terminal());
    }

    #[test]
    fn test_game_end_is_final() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.start(BoardId::A, Color::White, t0);
        c.on_game_end(t0);
        c.start(BoardId::A, Color::Black, t0);
        c.start(BoardId::B, Color::White, t0);
        assert_eq!(running(&c, BoardId::A), None);
        assert_eq!(running(&c, BoardId::B), None);
    }

    #[test]
    fn test_analysis_clocks_never_run() {
        let t0 = Instant::now();
        let mut c = ClockReconciler::new(SessionMode::Analysis, MIN, 0, t0);
        c.start(BoardId::A, Color::White, t0);
        assert_eq!(running(&c, BoardId::A), None);
        assert!(c.set_display(BoardId::A, Clocks::new(1, 2), t0));
        assert_eq!(c.timer(BoardId::A).clocks_at(t0), Clocks::new(1, 2));
    }

    #[test]
    fn test_clock_off_records_without_running() {
        let t0 = Instant::now();
        let mut c = live(t0).with_clock_on(false);
        c.start(BoardId::A, Color::White, t0);
        assert_eq!(running(&c, BoardId::A), None);

        let later = t0 + Duration::from_secs(2);
        c.on_move_confirmed(
            BoardId::A,
            Color::White,
            Clocks::new(58_000, 60_000),
            MoveOrigin::Remote,
            GameStatus::Started,
            later,
        );
        assert_eq!(running(&c, BoardId::A), None);
        assert_eq!(c.timer(BoardId::A).clocks_at(later), Clocks::new(58_000, 60_000));
        assert!(!c.on_flag(BoardId::A, Color::White, Color::White));
    }

    #[test]
    fn test_flag_reported_once_for_side_to_move() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.start(BoardId::A, Color::White, t0);
        assert!(!c.on_flag(BoardId::A, Color::Black, Color::White));
        assert!(c.on_flag(BoardId::A, Color::White, Color::White));
        assert!(!c.on_flag(BoardId::A, Color::White, Color::White));
    }

    #[test]
    fn test_stale_flag_after_switch_is_ignored() {
        let t0 = Instant::now();
        let mut c = live(t0);
        c.start(BoardId::A, Color::White, t0);
        c.start(BoardId::A, Color::Black, t0);
        assert!(!c.on_flag(BoardId::A, Color::White, Color::White));
    }
}
