//! The per-game synchronization core.
//!
//! [`SyncController`] owns the move history, the four clocks, the pending
//! move queue and one rules engine per board. Every input (server message,
//! local action, engine line) is handled to completion and answered with a
//! list of [`Effect`]s for the host to carry out.

mod analysis;
mod board;
mod moves;
mod navigation;

use std::collections::BTreeMap;
use std::time::Instant;

use bughouse::fen;
use bughouse::pgn::{self, Labeller, PgnHeaders};
use bughouse::{
    BoardId, ClockReconciler, Color, CozyRules, GameStatus, MoveHistory, PlyIndex,
    ReconnectMoveQueue, RulesEngine, SessionMode, Step,
};
use chrono::{Local, NaiveDate};
use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::SyncError;
use crate::events::{Effect, RenderUpdate};
use crate::messages::{
    ChatLine, GameRef, InboundMessage, MoveMessage, OfferMessage, OutboundMessage,
    PresenceQuery, ReconnectMessage, UserConnected,
};
use crate::view::{
    BoardView, ClockView, DisplayPreferences, MoveListEntry, OfferKind, SyncSnapshot,
};

use analysis::AnalysisState;

/// Who plays where, and how the game was set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSetup {
    pub game_id: String,
    pub mode: SessionMode,
    /// Local user; empty for an anonymous spectator.
    pub username: String,
    pub white_a: String,
    pub black_a: String,
    pub white_b: String,
    pub black_b: String,
    pub base_ms: u64,
    pub increment_ms: u64,
    /// `"<fen A> | <fen B>"`
    pub fen: String,
}

impl Default for GameSetup {
    fn default() -> Self {
        Self {
            game_id: String::new(),
            mode: SessionMode::Live,
            username: String::new(),
            white_a: String::new(),
            black_a: String::new(),
            white_b: String::new(),
            black_b: String::new(),
            base_ms: 180_000,
            increment_ms: 0,
            fen: format!("{} | {}", fen::START_FEN, fen::START_FEN),
        }
    }
}

impl GameSetup {
    pub fn player(&self, board: BoardId, color: Color) -> &str {
        match (board, color) {
            (BoardId::A, Color::White) => &self.white_a,
            (BoardId::A, Color::Black) => &self.black_a,
            (BoardId::B, Color::White) => &self.white_b,
            (BoardId::B, Color::Black) => &self.black_b,
        }
    }

    /// Color the local user plays on `board`, if any.
    pub fn my_color(&self, board: BoardId) -> Option<Color> {
        if self.username.is_empty() {
            return None;
        }
        [Color::White, Color::Black]
            .into_iter()
            .find(|&color| self.player(board, color) == self.username)
    }

    pub fn is_spectator(&self) -> bool {
        BoardId::ALL.iter().all(|&b| self.my_color(b).is_none())
    }

    /// Distinct, non-empty player names.
    pub fn players(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(4);
        for name in [&self.white_a, &self.black_a, &self.white_b, &self.black_b] {
            if !name.is_empty() && !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

/// Actions a player can take outside of moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    OfferDraw,
    RejectDraw,
    Resign,
    OfferRematch,
    RejectRematch,
}

/// One board's displayed position.
struct BoardState {
    rules: Box<dyn RulesEngine>,
    last_move: Option<String>,
    turn: Color,
    check: bool,
    premove: Option<String>,
}

impl BoardState {
    fn new(rules: Box<dyn RulesEngine>) -> Result<Self, SyncError> {
        let turn = fen::side_to_move(rules.position())?;
        let check = rules.is_check();
        Ok(Self {
            rules,
            last_move: None,
            turn,
            check,
            premove: None,
        })
    }

    fn fen(&self) -> &str {
        self.rules.position()
    }

    fn load(&mut self, fen: &str, last_move: Option<String>) -> Result<(), SyncError> {
        self.rules.set_position(fen)?;
        self.turn = fen::side_to_move(fen)?;
        self.check = self.rules.is_check();
        self.last_move = last_move;
        Ok(())
    }
}

/// Viewed ply, on the main line or in the open variation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    ply: PlyIndex,
    in_variation: bool,
}

pub struct SyncController {
    setup: GameSetup,
    config: SessionConfig,
    history: MoveHistory,
    clocks: ClockReconciler,
    queue: ReconnectMoveQueue,
    boards: EnumMap<BoardId, BoardState>,
    /// Side to move in the live game, independent of what is being viewed.
    live_turns: EnumMap<BoardId, Color>,
    status: GameStatus,
    result: String,
    /// Latest ply confirmed by the server; `None` before the first board message.
    ply: Option<PlyIndex>,
    cursor: Cursor,
    connected: bool,
    analysis: AnalysisState,
}

impl SyncController {
    /// Controller with cozy-chess rules on both boards.
    pub fn new(setup: GameSetup, config: SessionConfig, now: Instant) -> Result<Self, SyncError> {
        let (fen_a, fen_b) = fen::split_pair(&setup.fen)?;
        let rules_a = CozyRules::new(&fen_a)?;
        let rules_b = CozyRules::new(&fen_b)?;
        Self::with_rules(setup, config, Box::new(rules_a), Box::new(rules_b), now)
    }

    pub fn with_rules(
        setup: GameSetup,
        config: SessionConfig,
        rules_a: Box<dyn RulesEngine>,
        rules_b: Box<dyn RulesEngine>,
        now: Instant,
    ) -> Result<Self, SyncError> {
        let (fen_a, fen_b) = fen::split_pair(&setup.fen)?;
        let initial = Step::initial(fen_a.clone(), fen_b, fen::side_to_move(&fen_a)?);
        let boards = EnumMap::from_array([BoardState::new(rules_a)?, BoardState::new(rules_b)?]);
        let live_turns = EnumMap::from_fn(|b: BoardId| boards[b].turn);
        tracing::debug!(game = %setup.game_id, mode = ?setup.mode, "Creating sync controller");

        Ok(Self {
            history: MoveHistory::new(setup.mode, initial),
            clocks: ClockReconciler::new(setup.mode, setup.base_ms, setup.increment_ms, now)
                .with_clock_on(config.clock_on),
            queue: ReconnectMoveQueue::new(),
            boards,
            live_turns,
            status: GameStatus::Created,
            result: "*".to_string(),
            ply: None,
            cursor: Cursor::default(),
            connected: true,
            analysis: AnalysisState::default(),
            setup,
            config,
        })
    }

    pub fn setup(&self) -> &GameSetup {
        &self.setup
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &MoveHistory {
        &self.history
    }

    pub fn clocks(&self) -> &ClockReconciler {
        &self.clocks
    }

    pub fn queue(&self) -> &ReconnectMoveQueue {
        &self.queue
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Latest server-confirmed ply.
    pub fn ply(&self) -> Option<PlyIndex> {
        self.ply
    }

    pub fn view_ply(&self) -> (PlyIndex, bool) {
        (self.cursor.ply, self.cursor.in_variation)
    }

    pub fn position(&self, board: BoardId) -> &str {
        self.boards[board].fen()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handle one message from the server.
    ///
    /// Messages for another game are dropped. A ply that cannot be
    /// reconciled turns into a request for a full snapshot.
    pub fn on_inbound(
        &mut self,
        msg: InboundMessage,
        now: Instant,
    ) -> Result<Vec<Effect>, SyncError> {
        tracing::debug!(kind = msg.kind(), "Inbound message");
        match self.dispatch(msg, now) {
            Err(SyncError::UnknownGame(id)) => {
                tracing::debug!("Ignoring message for unknown game {}", id);
                Ok(Vec::new())
            }
            Err(SyncError::ReconcileGapTooLarge { local, got }) => {
                tracing::warn!(?local, got, "Cannot reconcile board message, requesting resync");
                Ok(vec![self.send(OutboundMessage::BoardRequest(self.game_ref()))])
            }
            other => other,
        }
    }

    fn dispatch(&mut self, msg: InboundMessage, now: Instant) -> Result<Vec<Effect>, SyncError> {
        if let Some(id) = msg.game_id() {
            if id != self.setup.game_id {
                return Err(SyncError::UnknownGame(id.to_string()));
            }
        }
        match msg {
            InboundMessage::Board(board) => self.on_board_message(board, now),
            InboundMessage::Move(echo) => {
                // Confirmation comes with the board message.
                tracing::debug!(board = %echo.board, ply = echo.ply, "Move echo {}", echo.mv);
                Ok(Vec::new())
            }
            InboundMessage::GameEnd(end) => Ok(self.update_status(end.status, end.result, now)),
            InboundMessage::DrawOffer(m) => Ok(self.offer(OfferKind::Draw, m)),
            InboundMessage::DrawRejected(m) => Ok(self.offer(OfferKind::DrawRejected, m)),
            InboundMessage::RematchOffer(m) => Ok(self.offer(OfferKind::Rematch, m)),
            InboundMessage::RematchRejected(m) => Ok(self.offer(OfferKind::RematchRejected, m)),
            InboundMessage::UserConnected(m) => Ok(self.on_user_connected(m)),
            InboundMessage::UserPresent(m) => Ok(vec![Effect::Render(RenderUpdate::Presence {
                username: m.username,
                online: true,
            })]),
            InboundMessage::UserDisconnected(m) => {
                Ok(vec![Effect::Render(RenderUpdate::Presence {
                    username: m.username,
                    online: false,
                })])
            }
            InboundMessage::Chat(line) => {
                if !self.chat_visible(&line) {
                    return Ok(Vec::new());
                }
                Ok(vec![Effect::Render(RenderUpdate::Chat(line))])
            }
            InboundMessage::FullChat(chat) => {
                let lines: Vec<ChatLine> = chat
                    .lines
                    .into_iter()
                    .filter(|line| self.chat_visible(line))
                    .collect();
                Ok(vec![Effect::Render(RenderUpdate::ChatHistory { lines })])
            }
            InboundMessage::Unknown => Ok(Vec::new()),
        }
    }

    /// The transport lost its connection.
    pub fn on_disconnect(&mut self) -> Vec<Effect> {
        if !self.connected {
            return Vec::new();
        }
        self.connected = false;
        self.queue.mark_disconnected();
        tracing::info!(pending = self.queue.len(), "Connection lost");
        vec![Effect::Render(RenderUpdate::Connection { connected: false })]
    }

    /// The transport is back: replay unconfirmed moves and ask for a snapshot.
    pub fn on_reconnect(&mut self) -> Vec<Effect> {
        self.connected = true;
        let mut effects = Vec::new();
        for board in BoardId::ALL {
            if self.boards[board].premove.take().is_some() {
                effects.push(self.render_board(board));
            }
        }

        let queued = self.queue.flush_on_reconnect();
        tracing::info!(replayed = queued.len(), "Reconnected");
        if !queued.is_empty() {
            let game_id = self.setup.game_id.clone();
            effects.push(self.send(OutboundMessage::Reconnect(ReconnectMessage {
                moves_queued: queued
                    .iter()
                    .map(|p| MoveMessage::from_pending(&game_id, p))
                    .collect(),
                game_id,
            })));
        }
        effects.push(self.send(OutboundMessage::BoardRequest(self.game_ref())));
        effects.push(Effect::Render(RenderUpdate::Connection { connected: true }));
        effects
    }

    pub fn player_action(&mut self, action: PlayerAction) -> Result<Vec<Effect>, SyncError> {
        if self.setup.is_spectator() {
            return Err(SyncError::NotAPlayer);
        }
        if !self.connected {
            return Err(SyncError::Disconnected);
        }
        let game = self.game_ref();
        let msg = match action {
            PlayerAction::OfferDraw | PlayerAction::Resign if self.status.is_terminal() => {
                return Err(SyncError::GameOver)
            }
            PlayerAction::OfferDraw => OutboundMessage::Draw(game),
            PlayerAction::RejectDraw => OutboundMessage::RejectDraw(game),
            PlayerAction::Resign => OutboundMessage::Resign(game),
            PlayerAction::OfferRematch => OutboundMessage::Rematch(game),
            PlayerAction::RejectRematch => OutboundMessage::RejectRematch(game),
        };
        tracing::info!(?action, "Player action");
        Ok(vec![self.send(msg)])
    }

    /// A clock of the local player ran out according to the external ticker.
    pub fn on_flag(&mut self, board: BoardId, color: Color) -> Vec<Effect> {
        if self.setup.my_color(board) != Some(color) {
            return Vec::new();
        }
        if self.clocks.on_flag(board, color, self.live_turns[board]) {
            tracing::info!(board = %board, %color, "Flag fell");
            vec![self.send(OutboundMessage::Flag(self.game_ref()))]
        } else {
            tracing::debug!(board = %board, %color, "Ignoring stale flag");
            Vec::new()
        }
    }

    /// Report any of the local player's running clocks that reached zero.
    pub fn check_flags(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        for board in BoardId::ALL {
            let Some(color) = self.setup.my_color(board) else {
                continue;
            };
            let timer = self.clocks.timer(board);
            if timer.active_side() == Some(color) && timer.remaining_at(color, now) == 0 {
                effects.extend(self.on_flag(board, color));
            }
        }
        effects
    }

    /// True while any clock is running.
    pub fn clocks_running(&self) -> bool {
        BoardId::ALL
            .iter()
            .any(|&b| self.clocks.timer(b).active_side().is_some())
    }

    /// Move text up to the viewed ply, following the open variation when
    /// it is being viewed. Dated today.
    pub fn export_pgn(&self) -> String {
        self.export_pgn_on(Local::now().date_naive())
    }

    pub fn export_pgn_on(&self, date: NaiveDate) -> String {
        let headers = PgnHeaders {
            event: "Bughouse".to_string(),
            site: self.setup.game_id.clone(),
            date: date.format("%Y.%m.%d").to_string(),
            white_a: self.setup.white_a.clone(),
            black_a: self.setup.black_a.clone(),
            white_b: self.setup.white_b.clone(),
            black_b: self.setup.black_b.clone(),
            result: self.result.clone(),
            ..Default::default()
        };
        let inside = self
            .history
            .open_handle()
            .filter(|_| self.cursor.in_variation)
            .map(|h| self.cursor.ply - h.fork_ply());
        pgn::export(&self.history, self.cursor.ply, inside, &headers)
    }

    pub fn snapshot(&self, now: Instant) -> SyncSnapshot {
        SyncSnapshot {
            game_id: self.setup.game_id.clone(),
            mode: self.setup.mode,
            status: self.status,
            result: self.result.clone(),
            ply: self.ply,
            view_ply: self.cursor.ply,
            in_variation: self.cursor.in_variation,
            boards: BoardId::ALL.iter().map(|&b| self.board_view(b)).collect(),
            clocks: self.clock_views(now),
            moves: self.move_list(),
            pending: self.queue.iter().cloned().collect(),
            connected: self.connected,
            analysing: self.analysis.board(),
            display: DisplayPreferences {
                blindfold: self.config.blindfold,
                animation: self.config.animation,
                clock_on: self.config.clock_on,
            },
        }
    }

    fn game_ref(&self) -> GameRef {
        GameRef {
            game_id: self.setup.game_id.clone(),
        }
    }

    fn send(&self, msg: OutboundMessage) -> Effect {
        Effect::Send(msg)
    }

    fn offer(&self, offer: OfferKind, msg: OfferMessage) -> Vec<Effect> {
        let incoming = msg.username != self.setup.username;
        vec![Effect::Render(RenderUpdate::Offer {
            offer,
            message: msg.message,
            username: msg.username,
            incoming,
        })]
    }

    fn on_user_connected(&self, msg: UserConnected) -> Vec<Effect> {
        let mut effects = vec![Effect::Render(RenderUpdate::Presence {
            username: msg.username,
            online: true,
        })];
        for username in self.setup.players() {
            effects.push(self.send(OutboundMessage::IsUserPresent(PresenceQuery {
                game_id: self.setup.game_id.clone(),
                username: username.to_string(),
            })));
        }
        if !self.setup.is_spectator() && msg.ply == 0 {
            effects.push(self.send(OutboundMessage::Ready(self.game_ref())));
        }
        // Picks up moves made while the socket was being established.
        effects.push(self.send(OutboundMessage::BoardRequest(self.game_ref())));
        effects
    }

    /// Players never see the spectator room; system lines are always shown.
    fn chat_visible(&self, line: &ChatLine) -> bool {
        self.setup.is_spectator() || line.room != "spectator" || line.user.is_empty()
    }

    /// Stop everything once the status is terminal.
    fn finish_if_terminal(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = vec![Effect::Render(RenderUpdate::Status {
            status: self.status,
            result: self.result.clone(),
        })];
        if !self.status.is_terminal() {
            return effects;
        }
        tracing::info!(status = ?self.status, result = %self.result, "Game over");
        self.clocks.on_game_end(now);
        for board in BoardId::ALL {
            self.boards[board].premove = None;
        }
        effects.push(self.render_clocks(now));
        effects.extend(self.render_boards());
        effects
    }

    fn at_latest(&self) -> bool {
        !self.cursor.in_variation && self.cursor.ply == self.history.last_ply()
    }

    fn can_move(&self, board: BoardId) -> bool {
        match self.setup.mode {
            SessionMode::Analysis => true,
            SessionMode::Live => {
                !self.status.is_terminal()
                    && self.at_latest()
                    && self.setup.my_color(board) == Some(self.live_turns[board])
            }
        }
    }

    fn board_view(&self, board: BoardId) -> BoardView {
        let state = &self.boards[board];
        let dests = if self.can_move(board) {
            state.rules.legal_destinations()
        } else {
            BTreeMap::new()
        };
        BoardView {
            board,
            fen: state.fen().to_string(),
            last_move: state.last_move.clone(),
            turn: state.turn,
            check: state.check,
            dests,
            premove: state.premove.clone(),
        }
    }

    fn render_board(&self, board: BoardId) -> Effect {
        Effect::Render(RenderUpdate::Board(self.board_view(board)))
    }

    fn render_boards(&self) -> Vec<Effect> {
        BoardId::ALL.iter().map(|&b| self.render_board(b)).collect()
    }

    fn clock_views(&self, now: Instant) -> Vec<ClockView> {
        let views = self.clocks.views(now);
        BoardId::ALL
            .iter()
            .map(|&board| ClockView {
                board,
                white: views[board][Color::White],
                black: views[board][Color::Black],
            })
            .collect()
    }

    fn render_clocks(&self, now: Instant) -> Effect {
        Effect::Render(RenderUpdate::Clocks {
            clocks: self.clock_views(now),
        })
    }

    fn move_list(&self) -> Vec<MoveListEntry> {
        let mut labeller = Labeller::new(self.history.initial());
        let fork = self.history.open_handle().map(|h| h.fork_ply());
        let mut at_fork = None;
        let mut entries = Vec::with_capacity(self.history.len());

        for (ply, step) in self.history.steps().iter().enumerate().skip(1) {
            if Some(ply) == fork {
                at_fork = Some(labeller.clone());
            }
            if let Some(label) = labeller.label(step) {
                entries.push(entry(ply, step, label.to_string(), label.board, false));
            }
        }
        if let (Some(fork), Some(mut labeller)) = (fork, at_fork) {
            for (idx, step) in self.history.variation(fork).unwrap_or(&[]).iter().enumerate() {
                if let Some(label) = labeller.label(step) {
                    entries.push(entry(fork + idx, step, label.to_string(), label.board, true));
                }
            }
        }
        entries
    }

    fn render_move_list(&self) -> Effect {
        Effect::Render(RenderUpdate::MoveList {
            moves: self.move_list(),
            active_ply: self.cursor.ply,
            in_variation: self.cursor.in_variation,
        })
    }
}

fn entry(ply: PlyIndex, step: &Step, label: String, board: BoardId, in_variation: bool) -> MoveListEntry {
    MoveListEntry {
        ply,
        board,
        label,
        san: step.san.clone().unwrap_or_default(),
        in_variation,
        has_variation: !in_variation && step.variation.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bughouse::fen::START_FEN;
    use bughouse::{Clocks, HistoryError, RulesError};
    use engine::EngineCommand;

    use crate::messages::{BoardMessage, GameEndMessage};

    const BASE: u64 = 60_000;

    /// Server-side model of a game that produces board messages.
    struct Server {
        fens: EnumMap<BoardId, String>,
        clocks: EnumMap<BoardId, Clocks>,
        steps: Vec<Step>,
    }

    impl Server {
        fn new() -> Self {
            Self::from_fen(START_FEN)
        }

        /// Board A starts from `fen_a`, board B from the standard position.
        fn from_fen(fen_a: &str) -> Self {
            Self {
                fens: EnumMap::from_array([fen_a.to_string(), START_FEN.to_string()]),
                clocks: EnumMap::from_fn(|_| Clocks::new(BASE, BASE)),
                steps: vec![Step::initial(
                    fen_a,
                    START_FEN,
                    fen::side_to_move(fen_a).unwrap(),
                )],
            }
        }

        fn pair(&self) -> String {
            format!("{} | {}", self.fens[BoardId::A], self.fens[BoardId::B])
        }

        fn message(&self, steps: Vec<Step>) -> BoardMessage {
            BoardMessage {
                game_id: "g1".to_string(),
                fen: self.pair(),
                ply: self.steps.len() - 1,
                steps,
                clocks: Some(self.clocks[BoardId::A]),
                clocks_b: Some(self.clocks[BoardId::B]),
                check: false,
                check_b: false,
                last_move: None,
                status: GameStatus::Started,
                result: "*".to_string(),
            }
        }

        fn initial(&self) -> InboundMessage {
            InboundMessage::Board(self.message(vec![self.steps[0].clone()]))
        }

        fn full(&self) -> InboundMessage {
            InboundMessage::Board(self.message(self.steps.clone()))
        }

        fn play(&mut self, board: BoardId, mv: &str, clocks: Clocks) -> InboundMessage {
            let mut rules = CozyRules::new(&self.fens[board]).unwrap();
            let outcome = rules.apply_move(mv).unwrap();
            self.fens[board] = outcome.fen.clone();
            self.clocks[board] = clocks;
            let mut step = Step {
                fen: self.fens[BoardId::A].clone(),
                fen_b: self.fens[BoardId::B].clone(),
                turn_color: fen::side_to_move(&outcome.fen).unwrap(),
                san: Some(outcome.san),
                board: Some(board),
                check: outcome.is_check,
                ..Default::default()
            };
            step.set_move(board, Some(outcome.uci));
            match board {
                BoardId::A => step.clocks = Some(clocks),
                BoardId::B => step.clocks_b = Some(clocks),
            }
            self.steps.push(step.clone());
            InboundMessage::Board(self.message(vec![step]))
        }
    }

    fn setup(username: &str, mode: SessionMode) -> GameSetup {
        GameSetup {
            game_id: "g1".to_string(),
            mode,
            username: username.to_string(),
            white_a: "alice".to_string(),
            black_a: "bob".to_string(),
            white_b: "carol".to_string(),
            black_b: "dave".to_string(),
            base_ms: BASE,
            increment_ms: 0,
            ..Default::default()
        }
    }

    fn started(username: &str, now: Instant) -> (SyncController, Server) {
        started_with(username, Server::new(), SessionConfig::default(), now)
    }

    fn started_with(
        username: &str,
        server: Server,
        config: SessionConfig,
        now: Instant,
    ) -> (SyncController, Server) {
        let mut setup = setup(username, SessionMode::Live);
        setup.fen = server.pair();
        let mut ctrl = SyncController::new(setup, config, now).unwrap();
        ctrl.on_inbound(server.initial(), now).unwrap();
        (ctrl, server)
    }

    fn analysis(now: Instant) -> SyncController {
        SyncController::new(
            setup("alice", SessionMode::Analysis),
            SessionConfig::default(),
            now,
        )
        .unwrap()
    }

    fn sent(effects: &[Effect]) -> Vec<&OutboundMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn engine_commands(effects: &[Effect]) -> Vec<&EngineCommand> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Engine(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_my_color_and_spectator() {
        let setup = setup("carol", SessionMode::Live);
        assert_eq!(setup.my_color(BoardId::B), Some(Color::White));
        assert_eq!(setup.my_color(BoardId::A), None);
        assert!(!setup.is_spectator());

        let anon = GameSetup::default();
        assert!(anon.is_spectator());
        assert!(anon.players().is_empty());
    }

    #[test]
    fn test_initial_message_starts_both_white_clocks() {
        let now = Instant::now();
        let (ctrl, _) = started("carol", now);
        assert_eq!(ctrl.ply(), Some(0));
        assert_eq!(ctrl.status(), GameStatus::Started);
        for board in BoardId::ALL {
            assert_eq!(ctrl.clocks().timer(board).active_side(), Some(Color::White));
        }
    }

    #[test]
    fn test_remote_move_switches_only_its_board() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("carol", now);
        let later = now + Duration::from_millis(2_000);

        let msg = server.play(BoardId::A, "e2e4", Clocks::new(58_000, 60_000));
        ctrl.on_inbound(msg, later).unwrap();

        let a = ctrl.clocks().timer(BoardId::A);
        assert_eq!(a.active_side(), Some(Color::Black));
        assert_eq!(a.remaining_at(Color::White, later), 58_000);
        assert_eq!(a.remaining_at(Color::Black, later), 60_000);

        let b = ctrl.clocks().timer(BoardId::B);
        assert_eq!(b.active_side(), Some(Color::White));
        assert_eq!(ctrl.history().len(), 2);
        assert_eq!(ctrl.history().last().fen_b, START_FEN);
        assert_eq!(ctrl.position(BoardId::B), START_FEN);
    }

    #[test]
    fn test_submit_move_is_sent_and_queued_until_confirmed() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("alice", now);

        let effects = ctrl.submit_move(BoardId::A, "e2e4", false, now).unwrap();
        let msgs = sent(&effects);
        assert_eq!(msgs.len(), 1);
        let OutboundMessage::Move(mv) = msgs[0] else {
            panic!("Expected a move message");
        };
        assert_eq!(mv.mv, "e2e4");
        assert_eq!(mv.ply, 1);
        assert_eq!(mv.board, BoardId::A);
        assert_eq!(ctrl.queue().len(), 1);
        assert_eq!(
            ctrl.clocks().timer(BoardId::A).active_side(),
            Some(Color::Black)
        );

        let confirm = server.play(BoardId::A, "e2e4", Clocks::new(59_500, 60_000));
        ctrl.on_inbound(confirm, now).unwrap();
        assert!(ctrl.queue().is_empty());
        assert_eq!(ctrl.ply(), Some(1));
        // Local moves keep the clocks switched at submission.
        assert_eq!(ctrl.clocks().confirmed(BoardId::A), Clocks::new(59_500, 60_000));
    }

    #[test]
    fn test_submit_move_checks_seat_and_turn() {
        let now = Instant::now();
        let (mut ctrl, _) = started("bob", now);
        assert!(matches!(
            ctrl.submit_move(BoardId::B, "e2e4", false, now),
            Err(SyncError::NotYourBoard(BoardId::B))
        ));
        assert!(matches!(
            ctrl.submit_move(BoardId::A, "e7e5", false, now),
            Err(SyncError::NotYourTurn(BoardId::A))
        ));
        assert!(ctrl.queue().is_empty());
    }

    #[test]
    fn test_gap_requests_full_board() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("carol", now);
        let _skipped = server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE));
        let msg = server.play(BoardId::A, "e7e5", Clocks::new(BASE, BASE));

        let effects = ctrl.on_inbound(msg, now).unwrap();
        assert_eq!(
            sent(&effects),
            vec![&OutboundMessage::BoardRequest(GameRef {
                game_id: "g1".to_string()
            })]
        );
        assert_eq!(ctrl.history().len(), 1);

        ctrl.on_inbound(server.full(), now).unwrap();
        assert_eq!(ctrl.ply(), Some(2));
        assert_eq!(ctrl.history().len(), 3);
        assert_eq!(ctrl.view_ply(), (2, false));
    }

    #[test]
    fn test_stale_and_foreign_messages_are_ignored() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("carol", now);
        let msg = server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE));
        ctrl.on_inbound(msg.clone(), now).unwrap();

        assert!(ctrl.on_inbound(msg, now).unwrap().is_empty());
        assert_eq!(ctrl.history().len(), 2);

        let InboundMessage::Board(mut foreign) = server.play(BoardId::B, "d2d4", Clocks::new(BASE, BASE))
        else {
            unreachable!()
        };
        foreign.game_id = "other".to_string();
        assert!(ctrl.on_inbound(InboundMessage::Board(foreign), now).unwrap().is_empty());
        assert_eq!(ctrl.history().len(), 2);
    }

    #[test]
    fn test_reconnect_replays_queue_and_snapshot_acknowledges() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("alice", now);
        ctrl.submit_move(BoardId::A, "e2e4", false, now).unwrap();

        ctrl.on_disconnect();
        assert!(matches!(
            ctrl.submit_move(BoardId::A, "d2d4", false, now),
            Err(SyncError::Disconnected)
        ));

        let effects = ctrl.on_reconnect();
        let msgs = sent(&effects);
        assert_eq!(msgs.len(), 2);
        let OutboundMessage::Reconnect(reconnect) = msgs[0] else {
            panic!("Expected a reconnect message");
        };
        assert_eq!(reconnect.moves_queued.len(), 1);
        assert_eq!(reconnect.moves_queued[0].mv, "e2e4");
        assert!(matches!(msgs[1], OutboundMessage::BoardRequest(_)));
        assert_eq!(ctrl.queue().len(), 1);

        server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE));
        ctrl.on_inbound(server.full(), now).unwrap();
        assert!(ctrl.queue().is_empty());
        assert_eq!(ctrl.ply(), Some(1));
    }

    #[test]
    fn test_premove_plays_after_opponent_moves() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("alice", now);
        ctrl.submit_move(BoardId::A, "e2e4", false, now).unwrap();
        ctrl.on_inbound(server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE)), now)
            .unwrap();

        let effects = ctrl.set_premove(BoardId::A, "d2d4", now).unwrap();
        assert!(sent(&effects).is_empty());
        assert_eq!(ctrl.snapshot(now).boards[0].premove.as_deref(), Some("d2d4"));

        let effects = ctrl
            .on_inbound(server.play(BoardId::A, "e7e5", Clocks::new(BASE, BASE)), now)
            .unwrap();
        let msgs = sent(&effects);
        assert_eq!(msgs.len(), 1);
        let OutboundMessage::Move(mv) = msgs[0] else {
            panic!("Expected the premove to be sent");
        };
        assert_eq!(mv.mv, "d2d4");
        assert_eq!(mv.ply, 3);
        assert_eq!(ctrl.snapshot(now).boards[0].premove, None);
    }

    #[test]
    fn test_illegal_premove_is_dropped() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("bob", now);
        ctrl.set_premove(BoardId::A, "e7e4", now).unwrap();
        let effects = ctrl
            .on_inbound(server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE)), now)
            .unwrap();
        assert!(sent(&effects).is_empty());
        assert!(ctrl.queue().is_empty());
    }

    #[test]
    fn test_game_end_stops_everything() {
        let now = Instant::now();
        let (mut ctrl, _) = started("alice", now);
        let end = InboundMessage::GameEnd(GameEndMessage {
            game_id: "g1".to_string(),
            status: GameStatus::Resign,
            result: "0-1".to_string(),
        });
        let effects = ctrl.on_inbound(end, now).unwrap();
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Render(RenderUpdate::Status {
                status: GameStatus::Resign,
                ..
            })
        )));
        assert!(!ctrl.clocks_running());
        assert!(matches!(
            ctrl.submit_move(BoardId::A, "e2e4", false, now),
            Err(SyncError::GameOver)
        ));
        assert!(matches!(
            ctrl.player_action(PlayerAction::Resign),
            Err(SyncError::GameOver)
        ));
        assert!(ctrl.player_action(PlayerAction::OfferRematch).is_ok());
    }

    #[test]
    fn test_flag_is_reported_once() {
        let now = Instant::now();
        let (mut ctrl, _) = started("alice", now);
        let late = now + Duration::from_millis(BASE + 1);

        let effects = ctrl.check_flags(late);
        assert_eq!(
            sent(&effects),
            vec![&OutboundMessage::Flag(GameRef {
                game_id: "g1".to_string()
            })]
        );
        assert!(ctrl.check_flags(late).is_empty());
    }

    #[test]
    fn test_flag_only_for_own_clock() {
        let now = Instant::now();
        let (mut ctrl, _) = started("bob", now);
        assert!(ctrl.on_flag(BoardId::A, Color::White).is_empty());
        assert!(ctrl.on_flag(BoardId::A, Color::Black).is_empty());
    }

    #[test]
    fn test_user_connected_queries_presence() {
        let now = Instant::now();
        let (mut ctrl, _) = started("alice", now);
        let msg = InboundMessage::UserConnected(UserConnected {
            username: "alice".to_string(),
            ply: 0,
        });
        let effects = ctrl.on_inbound(msg, now).unwrap();
        let msgs = sent(&effects);
        let queries = msgs
            .iter()
            .filter(|m| matches!(m, OutboundMessage::IsUserPresent(_)))
            .count();
        assert_eq!(queries, 4);
        assert!(msgs.iter().any(|m| matches!(m, OutboundMessage::Ready(_))));
        assert!(matches!(msgs.last(), Some(OutboundMessage::BoardRequest(_))));
    }

    #[test]
    fn test_players_do_not_see_spectator_chat() {
        let now = Instant::now();
        let (mut ctrl, _) = started("alice", now);
        let line = |room: &str, user: &str| ChatLine {
            room: room.to_string(),
            user: user.to_string(),
            message: "hi".to_string(),
            time: 0,
        };
        assert!(ctrl
            .on_inbound(InboundMessage::Chat(line("spectator", "eve")), now)
            .unwrap()
            .is_empty());
        assert_eq!(
            ctrl.on_inbound(InboundMessage::Chat(line("spectator", "")), now)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            ctrl.on_inbound(InboundMessage::Chat(line("player", "bob")), now)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_offers_are_marked_incoming() {
        let now = Instant::now();
        let (mut ctrl, _) = started("alice", now);
        let effects = ctrl
            .on_inbound(
                InboundMessage::DrawOffer(OfferMessage {
                    message: "Draw offer".to_string(),
                    username: "bob".to_string(),
                }),
                now,
            )
            .unwrap();
        assert!(matches!(
            &effects[..],
            [Effect::Render(RenderUpdate::Offer {
                offer: OfferKind::Draw,
                incoming: true,
                ..
            })]
        ));
    }

    #[test]
    fn test_spectator_cannot_act() {
        let now = Instant::now();
        let (mut ctrl, _) = started("", now);
        assert!(matches!(
            ctrl.player_action(PlayerAction::OfferDraw),
            Err(SyncError::NotAPlayer)
        ));
    }

    #[test]
    fn test_analysis_move_opens_and_reselects_variation() {
        let now = Instant::now();
        let mut ctrl = analysis(now);
        ctrl.submit_move(BoardId::A, "e2e4", false, now).unwrap();
        ctrl.submit_move(BoardId::A, "e7e5", false, now).unwrap();
        assert_eq!(ctrl.history().len(), 3);
        assert_eq!(ctrl.view_ply(), (2, false));

        ctrl.go_to_ply(1, false, now).unwrap();
        ctrl.submit_move(BoardId::A, "e7e5", false, now).unwrap();
        assert_eq!(ctrl.view_ply(), (2, false));
        assert!(ctrl.history().open_handle().is_none());

        ctrl.go_to_ply(1, false, now).unwrap();
        ctrl.submit_move(BoardId::A, "d7d5", false, now).unwrap();
        assert_eq!(ctrl.view_ply(), (2, true));
        assert_eq!(ctrl.history().variation(2).map(<[_]>::len), Some(1));
        assert_eq!(ctrl.history().len(), 3);

        ctrl.submit_move(BoardId::A, "e4d5", false, now).unwrap();
        assert_eq!(ctrl.view_ply(), (3, true));
        let moves = ctrl.snapshot(now).moves;
        assert_eq!(moves.iter().filter(|m| m.in_variation).count(), 2);
        assert!(moves.iter().any(|m| m.has_variation && m.ply == 2));

        let pgn = ctrl.export_pgn();
        assert!(pgn.contains("1A.e4 1a.d5 2A.exd5"), "{pgn}");
        assert!(!pgn.contains("e5"));

        ctrl.exit_variation(now).unwrap();
        assert_eq!(ctrl.view_ply(), (1, false));
        assert!(ctrl.history().variation(2).is_none());
    }

    #[test]
    fn test_analysis_capture_feeds_partner_pocket() {
        let now = Instant::now();
        let mut ctrl = analysis(now);
        for mv in ["e2e4", "d7d5", "e4d5"] {
            ctrl.submit_move(BoardId::A, mv, false, now).unwrap();
        }
        let last = ctrl.history().last();
        assert_eq!(last.captured, Some('p'));
        assert!(last.fen_b.contains("[p]"), "{}", last.fen_b);
    }

    #[test]
    fn test_variation_navigation_bounds() {
        let now = Instant::now();
        let mut ctrl = analysis(now);
        assert!(ctrl.go_to_ply(5, false, now).unwrap().is_empty());
        assert!(matches!(
            ctrl.go_to_ply(1, true, now),
            Err(SyncError::History(HistoryError::NoOpenVariation))
        ));
        assert!(ctrl.enter_variation(now).is_err());
    }

    #[test]
    fn test_engine_handshake_and_evaluation() {
        let now = Instant::now();
        let mut ctrl = analysis(now);

        let effects = ctrl.toggle_local_analysis(BoardId::A, true);
        assert_eq!(engine_commands(&effects), vec![&EngineCommand::IsReady]);

        let effects = ctrl.on_engine_line("readyok");
        let cmds = engine_commands(&effects);
        assert!(matches!(cmds.last(), Some(EngineCommand::Go(_))));
        assert!(cmds.contains(&&EngineCommand::Position {
            fen: START_FEN.to_string()
        }));

        let effects = ctrl.on_engine_line(
            "info depth 12 seldepth 15 multipv 1 score cp 150 nodes 4000 nps 200000 time 20 pv e2e4 e7e5",
        );
        let [Effect::Render(RenderUpdate::Evaluation(view))] = &effects[..] else {
            panic!("Expected an evaluation, got {effects:?}");
        };
        assert_eq!(view.score, "+1.5");
        assert_eq!(view.line, "1. e4 e5");
        assert!(ctrl.history().initial().evaluation.is_some());

        // Moving restarts the search from the new position.
        let effects = ctrl.submit_move(BoardId::A, "e2e4", false, now).unwrap();
        let cmds = engine_commands(&effects);
        assert_eq!(cmds, vec![&EngineCommand::Stop, &EngineCommand::IsReady]);

        let effects = ctrl.toggle_local_analysis(BoardId::A, false);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Render(RenderUpdate::ClearEvaluation { .. }))));
        assert_eq!(ctrl.analysing(), None);
    }

    #[test]
    fn test_engine_exit_resets_analysis() {
        let now = Instant::now();
        let mut ctrl = analysis(now);
        ctrl.toggle_local_analysis(BoardId::B, true);
        ctrl.on_engine_line("readyok");
        let effects = ctrl.on_engine_exit();
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Render(RenderUpdate::Notice { fatal: true, .. })
        )));
        assert_eq!(ctrl.analysing(), None);
        assert!(ctrl
            .on_engine_line("info depth 1 seldepth 1 multipv 1 score cp 0 nodes 1 nps 1 time 1 pv e2e4")
            .is_empty());
    }

    #[test]
    fn test_partner_board_move_uses_server_clocks() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("alice", now);
        let msg = server.play(BoardId::B, "e2e4", Clocks::new(55_000, BASE));
        ctrl.on_inbound(msg, now).unwrap();
        assert_eq!(
            ctrl.clocks().timer(BoardId::B).remaining_at(Color::White, now),
            55_000
        );
    }

    #[test]
    fn test_rejected_move_keeps_history_view() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("alice", now);
        ctrl.submit_move(BoardId::A, "e2e4", false, now).unwrap();
        ctrl.on_inbound(server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE)), now)
            .unwrap();
        ctrl.on_inbound(server.play(BoardId::A, "e7e5", Clocks::new(BASE, BASE)), now)
            .unwrap();
        ctrl.go_to_ply(0, false, now).unwrap();

        assert!(matches!(
            ctrl.submit_move(BoardId::A, "e2e5", false, now),
            Err(SyncError::Rules(RulesError::IllegalMove(_)))
        ));
        assert_eq!(ctrl.view_ply(), (0, false));
        assert_eq!(ctrl.position(BoardId::A), START_FEN);
        assert!(ctrl.queue().is_empty());

        // A legal move is played on the live position and brings the view along.
        let effects = ctrl.submit_move(BoardId::A, "g1f3", false, now).unwrap();
        assert_eq!(ctrl.view_ply(), (2, false));
        let OutboundMessage::Move(mv) = sent(&effects)[0] else {
            panic!("Expected a move message");
        };
        assert_eq!(mv.ply, 3);
    }

    #[test]
    fn test_drop_from_pocket_is_sent() {
        let now = Instant::now();
        let server = Server::from_fen("rnbqkbn1/ppppppp1/8/8/8/8/PPPPPPP1/RNBQKBN1[N] w Qq - 0 1");
        let (mut ctrl, _) = started_with("alice", server, SessionConfig::default(), now);

        let effects = ctrl.submit_move(BoardId::A, "N@e3", false, now).unwrap();
        let OutboundMessage::Move(mv) = sent(&effects)[0] else {
            panic!("Expected a move message");
        };
        assert_eq!(mv.mv, "N@e3");
        assert_eq!(
            ctrl.position(BoardId::A),
            "rnbqkbn1/ppppppp1/8/8/8/4N3/PPPPPPP1/RNBQKBN1[] b Qq - 1 1"
        );
        assert!(matches!(
            ctrl.submit_move(BoardId::A, "N@d3", false, now),
            Err(SyncError::NotYourTurn(BoardId::A))
        ));
    }

    #[test]
    fn test_drop_needs_the_piece_in_pocket() {
        let now = Instant::now();
        let (mut ctrl, _) = started("alice", now);
        assert!(matches!(
            ctrl.submit_move(BoardId::A, "Q@e3", false, now),
            Err(SyncError::Rules(RulesError::NotInPocket(_)))
        ));
        assert!(ctrl.queue().is_empty());
    }

    #[test]
    fn test_auto_promote_adds_queen() {
        let now = Instant::now();
        let fen_a = "4k3/P7/8/8/8/8/8/4K3[] w - - 0 1";
        let config = SessionConfig {
            auto_promote: true,
            ..Default::default()
        };
        let (mut ctrl, _) = started_with("alice", Server::from_fen(fen_a), config, now);
        let effects = ctrl.submit_move(BoardId::A, "a7a8", false, now).unwrap();
        let OutboundMessage::Move(mv) = sent(&effects)[0] else {
            panic!("Expected a move message");
        };
        assert_eq!(mv.mv, "a7a8q");
        assert!(ctrl.position(BoardId::A).starts_with("Q3k3/"));

        let (mut strict, _) =
            started_with("alice", Server::from_fen(fen_a), SessionConfig::default(), now);
        assert!(matches!(
            strict.submit_move(BoardId::A, "a7a8", false, now),
            Err(SyncError::Rules(RulesError::IllegalMove(_)))
        ));
    }

    #[test]
    fn test_clock_off_never_runs_clocks() {
        let now = Instant::now();
        let config = SessionConfig {
            clock_on: false,
            blindfold: true,
            ..Default::default()
        };
        let (mut ctrl, mut server) = started_with("carol", Server::new(), config, now);
        assert!(!ctrl.clocks_running());
        ctrl.on_inbound(server.play(BoardId::A, "e2e4", Clocks::new(58_000, BASE)), now)
            .unwrap();
        assert!(!ctrl.clocks_running());

        let snapshot = ctrl.snapshot(now);
        assert_eq!(snapshot.clocks[0].white.remaining_ms, 58_000);
        assert!(snapshot.display.blindfold);
        assert!(!snapshot.display.clock_on);
        assert!(ctrl.on_flag(BoardId::B, Color::White).is_empty());
    }

    #[test]
    fn test_pgn_carries_export_date() {
        let now = Instant::now();
        let (mut ctrl, mut server) = started("carol", now);
        ctrl.on_inbound(server.play(BoardId::A, "e2e4", Clocks::new(BASE, BASE)), now)
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let pgn = ctrl.export_pgn_on(date);
        assert!(pgn.contains("[Date \"2024.03.09\"]"));
        assert!(pgn.contains("1A.e4"));
    }
}
