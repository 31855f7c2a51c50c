//! Backup control endpoints.
//!
//! Status is always answered with 200: a scheduler without a registered job
//! reports the degraded record instead of failing.

use axum::{extract::State, http::StatusCode, Json};
use backupd_scheduler::{ScheduleStatus, SchedulerError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::app::AppState;

/// GET /backup/status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<ScheduleStatus> {
    Json(state.scheduler.get_schedule_status())
}

/// POST /backup/trigger
///
/// Runs create + upload now. The cycle is spawned so a client hanging up
/// does not cancel a half-written backup. Returns 200 + artifact on
/// success, 409 when a cycle is already running, 500 on failure.
pub async fn trigger_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    info!("manual backup requested over HTTP");

    let task_state = Arc::clone(&state);
    let result = tokio::spawn(async move { task_state.scheduler.trigger_manual_backup().await })
        .await
        .map_err(|e| {
            error!(error = %e, "manual backup task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "code": "INTERNAL", "error": "backup task aborted"})),
            )
        })?;

    match result {
        Ok(artifact) => Ok(Json(json!({"ok": true, "artifact": artifact}))),
        Err(e) => Err((status_for(&e), Json(json!({
            "ok": false,
            "code": e.code(),
            "error": e.to_string(),
        })))),
    }
}

/// POST /backup/stop: disarm the schedule. Idempotent.
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.stop_scheduled_backups().await;
    Json(json!({"ok": true}))
}

fn status_for(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::BackupInProgress => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
