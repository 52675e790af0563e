use engine::{AnalysisEngine, EngineEvent};

use crate::controller::SyncController;
use crate::error::SyncError;

/// Everything the session actor owns.
pub struct SessionState {
    pub controller: SyncController,
    /// Spawned the first time analysis is switched on.
    pub engine: Option<AnalysisEngine>,
}

impl SessionState {
    pub fn new(controller: SyncController) -> Self {
        Self {
            controller,
            engine: None,
        }
    }

    pub fn with_engine(controller: SyncController, engine: AnalysisEngine) -> Self {
        Self {
            controller,
            engine: Some(engine),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.controller.setup().game_id
    }

    /// Next engine event, or never when no engine is running.
    pub async fn next_engine_event(&mut self) -> Option<EngineEvent> {
        match self.engine.as_mut() {
            Some(engine) => engine.recv_event().await,
            None => std::future::pending().await,
        }
    }

    pub async fn ensure_engine(&mut self) -> Result<(), SyncError> {
        if self.engine.is_some() {
            return Ok(());
        }
        let options = self.controller.config().engine_options()?;
        let engine = AnalysisEngine::spawn(options).await?;
        if let Some(banner) = engine.banner() {
            tracing::info!("Analysis engine ready: {}", banner);
        }
        self.engine = Some(engine);
        Ok(())
    }

    pub async fn shutdown_engine(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
    }
}
