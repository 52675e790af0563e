use std::time::Instant;

use engine::{EngineEvent, LineDirection};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::Instrument;

use super::commands::{Reply, SessionCommand};
use super::state::SessionState;
use crate::error::SyncError;
use crate::events::{Effect, EngineLogEntry, SessionEvent};
use crate::messages::{InboundMessage, OutboundMessage};

/// Where the actor delivers effects.
pub(crate) struct Outputs {
    pub outbound_tx: mpsc::Sender<OutboundMessage>,
    pub event_tx: broadcast::Sender<SessionEvent>,
}

/// The main session actor loop.
/// Owns the controller and the engine. Handles commands, server messages,
/// engine output and clock ticks one at a time.
pub(crate) async fn run_session_actor(
    state: SessionState,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    outputs: Outputs,
) {
    let game_id = state.game_id().to_string();
    run_session_actor_inner(state, cmd_rx, inbound_rx, outputs)
        .instrument(tracing::info_span!("session", game = %game_id))
        .await;
}

async fn run_session_actor_inner(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    outputs: Outputs,
) {
    tracing::info!("Session actor started");

    let mut timer_interval = time::interval(time::Duration::from_millis(100));
    timer_interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            // Server state lands before local commands queued after it.
            Some(msg) = inbound_rx.recv() => {
                match state.controller.on_inbound(msg, Instant::now()) {
                    Ok(effects) => dispatch(&state, effects, &outputs).await,
                    Err(e) => {
                        tracing::error!("Failed to apply server message: {}", e);
                        let _ = outputs.event_tx.send(SessionEvent::Error { message: e.to_string() });
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Shutdown) | None => {
                        tracing::info!("Session actor shutting down");
                        state.shutdown_engine().await;
                        break;
                    }
                    Some(cmd) => handle_command(&mut state, cmd, &outputs).await,
                }
            }

            Some(engine_event) = state.next_engine_event() => {
                handle_engine_event(&mut state, engine_event, &outputs).await;
            }

            _ = timer_interval.tick(), if state.controller.clocks_running() => {
                let effects = state.controller.check_flags(Instant::now());
                dispatch(&state, effects, &outputs).await;
            }
        }
    }

    tracing::info!("Session actor exited");
}

async fn handle_command(state: &mut SessionState, cmd: SessionCommand, outputs: &Outputs) {
    let now = Instant::now();
    match cmd {
        SessionCommand::SubmitMove { board, mv, reply } => {
            let result = state.controller.submit_move(board, &mv, false, now);
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::SetPremove { board, mv, reply } => {
            let result = state.controller.set_premove(board, &mv, now);
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::CancelPremove { board, reply } => {
            let result = Ok(state.controller.cancel_premove(board));
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::GoToPly {
            ply,
            in_variation,
            reply,
        } => {
            let result = state.controller.go_to_ply(ply, in_variation, now);
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::EnterVariation { reply } => {
            let result = state.controller.enter_variation(now);
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::ExitVariation { reply } => {
            let result = state.controller.exit_variation(now);
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::ToggleAnalysis {
            board,
            enabled,
            reply,
        } => {
            if enabled {
                if let Err(e) = state.ensure_engine().await {
                    tracing::error!("Failed to start analysis engine: {}", e);
                    let _ = reply.send(Err(e));
                    return;
                }
            }
            let result = Ok(state.controller.toggle_local_analysis(board, enabled));
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::Flag {
            board,
            color,
            reply,
        } => {
            let result = Ok(state.controller.on_flag(board, color));
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::PlayerAction { action, reply } => {
            let result = state.controller.player_action(action);
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::Disconnected { reply } => {
            let result = Ok(state.controller.on_disconnect());
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::Reconnected { reply } => {
            let result = Ok(state.controller.on_reconnect());
            finish(state, result, reply, outputs).await;
        }
        SessionCommand::ExportPgn { reply } => {
            let _ = reply.send(state.controller.export_pgn());
        }
        SessionCommand::GetSnapshot { reply } => {
            let _ = reply.send(state.controller.snapshot(now));
        }
        SessionCommand::Subscribe { reply } => {
            let snapshot = state.controller.snapshot(now);
            let rx = outputs.event_tx.subscribe();
            let _ = reply.send((snapshot, rx));
        }
        SessionCommand::Shutdown => unreachable!(),
    }
}

/// Deliver the effects of a successful command, then reply.
async fn finish(
    state: &SessionState,
    result: Result<Vec<Effect>, SyncError>,
    reply: Reply,
    outputs: &Outputs,
) {
    match result {
        Ok(effects) => {
            dispatch(state, effects, outputs).await;
            let _ = reply.send(Ok(()));
        }
        Err(e) => {
            tracing::debug!("Command rejected: {}", e);
            let _ = reply.send(Err(e));
        }
    }
}

async fn dispatch(state: &SessionState, effects: Vec<Effect>, outputs: &Outputs) {
    for effect in effects {
        match effect {
            Effect::Send(msg) => {
                if outputs.outbound_tx.send(msg).await.is_err() {
                    tracing::warn!("Outbound channel closed, dropping message");
                }
            }
            Effect::Engine(cmd) => match &state.engine {
                Some(engine) => {
                    if let Err(e) = engine.send_command(cmd).await {
                        tracing::warn!("Failed to send engine command: {}", e);
                    }
                }
                None => tracing::debug!(?cmd, "No engine running, dropping command"),
            },
            Effect::Render(update) => {
                let _ = outputs.event_tx.send(SessionEvent::Render(update));
            }
        }
    }
}

async fn handle_engine_event(state: &mut SessionState, event: EngineEvent, outputs: &Outputs) {
    match event {
        EngineEvent::Raw { direction, line } => {
            let effects = match direction {
                LineDirection::FromEngine => state.controller.on_engine_line(&line),
                LineDirection::ToEngine => Vec::new(),
            };
            let _ = outputs.event_tx.send(SessionEvent::EngineLine(EngineLogEntry {
                direction: direction.into(),
                line,
            }));
            dispatch(state, effects, outputs).await;
        }
        EngineEvent::Exited => {
            state.engine = None;
            let effects = state.controller.on_engine_exit();
            dispatch(state, effects, outputs).await;
        }
    }
}
