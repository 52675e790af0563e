//! Wire messages exchanged with the game server.
//!
//! Both directions are JSON objects tagged by `"type"`.

use bughouse::{BoardId, Clocks, GameStatus, PendingMove, PlyIndex, Step};
use serde::{Deserialize, Serialize};

fn unfinished() -> String {
    "*".to_string()
}

/// Full or incremental state of both boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMessage {
    pub game_id: String,
    /// `"<fen A> | <fen B>"`
    pub fen: String,
    pub ply: PlyIndex,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub clocks: Option<Clocks>,
    #[serde(default)]
    pub clocks_b: Option<Clocks>,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub check_b: bool,
    #[serde(default)]
    pub last_move: Option<String>,
    pub status: GameStatus,
    #[serde(default = "unfinished")]
    pub result: String,
}

impl BoardMessage {
    /// More than one step: the whole game after a refresh or reconnect.
    pub fn is_full(&self) -> bool {
        self.steps.len() > 1
    }

    /// The first snapshot of a session carries only the initial step.
    pub fn is_initial(&self) -> bool {
        self.steps.last().is_some_and(|s| s.board.is_none())
    }

    pub fn clocks_for(&self, board: BoardId) -> Option<Clocks> {
        match board {
            BoardId::A => self.clocks,
            BoardId::B => self.clocks_b,
        }
    }
}

/// A move as sent by a player and echoed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMessage {
    pub game_id: String,
    #[serde(rename = "move")]
    pub mv: String,
    pub clocks: Clocks,
    pub clocks_b: Clocks,
    pub ply: PlyIndex,
    pub board: BoardId,
}

impl MoveMessage {
    pub fn from_pending(game_id: &str, pending: &PendingMove) -> Self {
        Self {
            game_id: game_id.to_string(),
            mv: pending.mv.clone(),
            clocks: pending.clocks,
            clocks_b: pending.clocks_b,
            ply: pending.ply,
            board: pending.board,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndMessage {
    pub game_id: String,
    pub status: GameStatus,
    #[serde(default = "unfinished")]
    pub result: String,
}

/// Draw or rematch offer, or its rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConnected {
    pub username: String,
    #[serde(default)]
    pub ply: PlyIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    #[serde(default)]
    pub room: String,
    pub user: String,
    pub message: String,
    #[serde(default)]
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullChat {
    pub lines: Vec<ChatLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "board")]
    Board(BoardMessage),
    #[serde(rename = "move")]
    Move(MoveMessage),
    #[serde(rename = "gameEnd")]
    GameEnd(GameEndMessage),
    #[serde(rename = "draw_offer")]
    DrawOffer(OfferMessage),
    #[serde(rename = "draw_rejected")]
    DrawRejected(OfferMessage),
    #[serde(rename = "rematch_offer")]
    RematchOffer(OfferMessage),
    #[serde(rename = "rematch_rejected")]
    RematchRejected(OfferMessage),
    #[serde(rename = "game_user_connected")]
    UserConnected(UserConnected),
    #[serde(rename = "user_present")]
    UserPresent(UserPresence),
    #[serde(rename = "user_disconnected")]
    UserDisconnected(UserPresence),
    #[serde(rename = "bugroundchat")]
    Chat(ChatLine),
    #[serde(rename = "fullchat")]
    FullChat(FullChat),
    /// Any message type this client does not handle.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Game the message belongs to, for messages that name one.
    pub fn game_id(&self) -> Option<&str> {
        match self {
            Self::Board(m) => Some(&m.game_id),
            Self::Move(m) => Some(&m.game_id),
            Self::GameEnd(m) => Some(&m.game_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Board(_) => "board",
            Self::Move(_) => "move",
            Self::GameEnd(_) => "gameEnd",
            Self::DrawOffer(_) => "draw_offer",
            Self::DrawRejected(_) => "draw_rejected",
            Self::RematchOffer(_) => "rematch_offer",
            Self::RematchRejected(_) => "rematch_rejected",
            Self::UserConnected(_) => "game_user_connected",
            Self::UserPresent(_) => "user_present",
            Self::UserDisconnected(_) => "user_disconnected",
            Self::Chat(_) => "bugroundchat",
            Self::FullChat(_) => "fullchat",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    pub game_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectMessage {
    pub game_id: String,
    pub moves_queued: Vec<MoveMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceQuery {
    pub game_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "move")]
    Move(MoveMessage),
    /// Moves that may not have reached the server before the connection dropped.
    #[serde(rename = "reconnect")]
    Reconnect(ReconnectMessage),
    /// Ask for a full board snapshot.
    #[serde(rename = "board")]
    BoardRequest(GameRef),
    #[serde(rename = "ready")]
    Ready(GameRef),
    #[serde(rename = "draw")]
    Draw(GameRef),
    #[serde(rename = "reject_draw")]
    RejectDraw(GameRef),
    #[serde(rename = "resign")]
    Resign(GameRef),
    #[serde(rename = "rematch")]
    Rematch(GameRef),
    #[serde(rename = "reject_rematch")]
    RejectRematch(GameRef),
    #[serde(rename = "flag")]
    Flag(GameRef),
    #[serde(rename = "is_user_present")]
    IsUserPresent(PresenceQuery),
}
