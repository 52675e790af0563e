use bughouse::{BoardId, Color};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::SessionCommand;
use crate::controller::PlayerAction;
use crate::error::SyncError;
use crate::events::SessionEvent;
use crate::view::SyncSnapshot;

/// Cheap, cloneable handle to a session actor.
#[derive(Clone)]
pub struct SessionHandle {
    game_id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(game_id: String, cmd_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { game_id, cmd_tx }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub async fn submit_move(&self, board: BoardId, mv: &str) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::SubmitMove {
            board,
            mv: mv.to_string(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn set_premove(&self, board: BoardId, mv: &str) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::SetPremove {
            board,
            mv: mv.to_string(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn cancel_premove(&self, board: BoardId) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::CancelPremove { board, reply: tx })
            .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn go_to_ply(&self, ply: usize, in_variation: bool) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GoToPly {
            ply,
            in_variation,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn enter_variation(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::EnterVariation { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn exit_variation(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::ExitVariation { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    /// Start or stop local analysis of `board`, launching the engine on
    /// first use.
    pub async fn toggle_analysis(&self, board: BoardId, enabled: bool) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::ToggleAnalysis {
            board,
            enabled,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn flag(&self, board: BoardId, color: Color) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Flag {
            board,
            color,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn player_action(&self, action: PlayerAction) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::PlayerAction { action, reply: tx })
            .await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn disconnected(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Disconnected { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn reconnected(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Reconnected { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())?
    }

    pub async fn export_pgn(&self) -> Result<String, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::ExportPgn { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())
    }

    pub async fn snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetSnapshot { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())
    }

    pub async fn subscribe(
        &self,
    ) -> Result<(SyncSnapshot, broadcast::Receiver<SessionEvent>), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe { reply: tx }).await?;
        rx.await.map_err(|_| reply_dropped())
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SyncError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SyncError::Internal("Session actor closed".into()))
    }
}

fn reply_dropped() -> SyncError {
    SyncError::Internal("Reply dropped".into())
}
