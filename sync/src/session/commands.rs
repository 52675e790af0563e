use bughouse::{BoardId, Color};
use tokio::sync::{broadcast, oneshot};

use crate::controller::PlayerAction;
use crate::error::SyncError;
use crate::events::SessionEvent;
use crate::view::SyncSnapshot;

pub type Reply = oneshot::Sender<Result<(), SyncError>>;

/// Commands sent to the session actor. Each embeds a oneshot for the reply.
/// Server messages arrive on their own channel.
pub enum SessionCommand {
    SubmitMove {
        board: BoardId,
        mv: String,
        reply: Reply,
    },
    SetPremove {
        board: BoardId,
        mv: String,
        reply: Reply,
    },
    CancelPremove {
        board: BoardId,
        reply: Reply,
    },
    GoToPly {
        ply: usize,
        in_variation: bool,
        reply: Reply,
    },
    EnterVariation {
        reply: Reply,
    },
    ExitVariation {
        reply: Reply,
    },
    ToggleAnalysis {
        board: BoardId,
        enabled: bool,
        reply: Reply,
    },
    /// Time-out reported by an external ticker.
    Flag {
        board: BoardId,
        color: Color,
        reply: Reply,
    },
    PlayerAction {
        action: PlayerAction,
        reply: Reply,
    },
    /// The transport dropped.
    Disconnected {
        reply: Reply,
    },
    /// The transport is back.
    Reconnected {
        reply: Reply,
    },
    ExportPgn {
        reply: oneshot::Sender<String>,
    },
    GetSnapshot {
        reply: oneshot::Sender<SyncSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<(SyncSnapshot, broadcast::Receiver<SessionEvent>)>,
    },
    Shutdown,
}
