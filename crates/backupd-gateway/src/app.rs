use axum::{
    routing::{get, post},
    Router,
};
use backupd_core::BackupdConfig;
use backupd_scheduler::{BackupScheduler, JobRegistry};
use std::sync::Arc;

use crate::pipeline::CommandPipeline;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: BackupdConfig,
    pub scheduler: BackupScheduler<CommandPipeline>,
}

impl AppState {
    /// Wire the scheduler to a shell-command pipeline and the given registry.
    pub fn new(config: BackupdConfig, registry: Arc<JobRegistry>) -> anyhow::Result<Self> {
        let pipeline = Arc::new(CommandPipeline::new(config.pipeline.clone()));
        let scheduler = BackupScheduler::new(config.schedule.clone(), registry, pipeline)?;
        Ok(Self { config, scheduler })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/backup/status", get(crate::http::backup::status_handler))
        .route("/backup/trigger", post(crate::http::backup::trigger_handler))
        .route("/backup/stop", post(crate::http::backup::stop_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
