//! Run control handlers.
//!
//! Triggers only claim the coordinator and return; the run itself executes on
//! the coordinator's worker.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use harvester_core::{
    CleanupSummary, CoordinatorError, CoordinatorStatus, FileFilter, PublicationFilter,
    RecordFilter, RunLog, RunLogFilter, RunMode, TriggerError, TriggerKind,
};

use crate::state::AppState;

const DEFAULT_LOG_LIMIT: i64 = 20;
const MAX_LOG_LIMIT: i64 = 200;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: String,
    pub mode: RunMode,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Row counts across the stores.
#[derive(Debug, Serialize)]
pub struct Totals {
    pub publications: i64,
    pub files: i64,
    pub records: i64,
    pub runs: i64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleInfo {
    pub enabled: bool,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub coordinator: CoordinatorStatus,
    pub totals: Totals,
    pub schedule: ScheduleInfo,
    pub last_run: Option<RunLog>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<RunLog>,
    pub total: i64,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

async fn trigger(
    state: &AppState,
    mode: RunMode,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    match state.coordinator().trigger(TriggerKind::Manual, mode).await {
        Ok(run_id) => Ok((StatusCode::ACCEPTED, Json(TriggerResponse { run_id, mode }))),
        Err(TriggerError::AlreadyRunning(_)) => {
            Err(api_error(StatusCode::CONFLICT, "run in progress"))
        }
        Err(e @ TriggerError::WorkerUnavailable) => {
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

/// Start a full manual run.
pub async fn run(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    trigger(&state, RunMode::Full).await
}

/// Start a run that stops after downloading.
pub async fn download(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    trigger(&state, RunMode::DownloadOnly).await
}

/// Start a run that only extracts files already downloaded.
pub async fn extract(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    trigger(&state, RunMode::ExtractOnly).await
}

pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let coordinator = state.coordinator().status().await;

    let totals = Totals {
        publications: state
            .store()
            .count_publications(&PublicationFilter::new())
            .map_err(internal)?,
        files: state
            .store()
            .count_files(&FileFilter::new())
            .map_err(internal)?,
        records: state
            .store()
            .count_records(&RecordFilter::new())
            .map_err(internal)?,
        runs: state
            .run_logs()
            .count(&RunLogFilter::new())
            .map_err(internal)?,
    };
    let last_run = state.run_logs().latest().map_err(internal)?;

    let scheduler = &state.config().scheduler;
    Ok(Json(StatusResponse {
        coordinator,
        totals,
        schedule: ScheduleInfo {
            enabled: scheduler.enabled,
            description: scheduler.describe(),
        },
        last_run,
    }))
}

/// Latest run logs, newest first.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let filter = RunLogFilter::new().with_limit(limit);

    let logs = state.run_logs().query(&filter).map_err(internal)?;
    let total = state
        .run_logs()
        .count(&RunLogFilter::new())
        .map_err(internal)?;
    Ok(Json(LogsResponse { logs, total }))
}

/// Delete every publication, run log and downloaded file.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CleanupSummary>, ApiError> {
    match state.coordinator().cleanup().await {
        Ok(summary) => Ok(Json(summary)),
        Err(CoordinatorError::Busy(_)) => Err(api_error(StatusCode::CONFLICT, "run in progress")),
        Err(e) => Err(internal(e)),
    }
}
