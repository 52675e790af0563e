//! Actor wrapper that owns a [`SyncController`] and its analysis engine.

pub mod actor;
pub mod commands;
pub mod handle;
pub mod state;

use tokio::sync::{broadcast, mpsc};

use crate::controller::SyncController;
use crate::events::SessionEvent;
use crate::messages::{InboundMessage, OutboundMessage};
use actor::{run_session_actor, Outputs};
pub use handle::SessionHandle;
use state::SessionState;

/// The ends of a running session that the host wires to its transport
/// and renderer.
pub struct SessionChannels {
    pub handle: SessionHandle,
    /// Server messages in.
    pub inbound: mpsc::Sender<InboundMessage>,
    /// Messages for the server.
    pub outbound: mpsc::Receiver<OutboundMessage>,
    pub events: broadcast::Receiver<SessionEvent>,
}

/// Spawn the actor task for one game. Must be called inside a tokio runtime.
pub fn spawn_session(controller: SyncController) -> SessionChannels {
    spawn_with_state(SessionState::new(controller))
}

/// Like [`spawn_session`], with an engine that is already running.
pub fn spawn_session_with_engine(
    controller: SyncController,
    engine: engine::AnalysisEngine,
) -> SessionChannels {
    spawn_with_state(SessionState::with_engine(controller, engine))
}

fn spawn_with_state(state: SessionState) -> SessionChannels {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = broadcast::channel(100);

    let handle = SessionHandle::new(state.game_id().to_string(), cmd_tx);
    tracing::debug!(game = %handle.game_id(), "Spawning session actor");
    tokio::spawn(run_session_actor(
        state,
        cmd_rx,
        inbound_rx,
        Outputs {
            outbound_tx,
            event_tx,
        },
    ));

    SessionChannels {
        handle,
        inbound: inbound_tx,
        outbound: outbound_rx,
        events: event_rx,
    }
}
