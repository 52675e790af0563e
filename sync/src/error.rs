use bughouse::{BoardId, FenError, HistoryError, PlyIndex, QueueError, RulesError};
use engine::{EngineError, ProtocolError};

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Fen(#[from] FenError),
    #[error("Engine protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Message for unknown game {0}")]
    UnknownGame(String),
    #[error("Cannot reconcile ply {got} with local ply {local:?}")]
    ReconcileGapTooLarge {
        local: Option<PlyIndex>,
        got: PlyIndex,
    },
    #[error("Not your turn on board {0}")]
    NotYourTurn(BoardId),
    #[error("You are not playing on board {0}")]
    NotYourBoard(BoardId),
    #[error("Spectators cannot do that")]
    NotAPlayer,
    #[error("Game is over")]
    GameOver,
    #[error("Not connected to the server")]
    Disconnected,
    #[error("Internal error: {0}")]
    Internal(String),
}
