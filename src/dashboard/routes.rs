//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is the shared `Arc<Scheduler>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::scheduler::Scheduler;
use crate::types::{EntitySnapshot, OddsheetError, TaskState, TaskStatus};

pub type AppState = Arc<Scheduler>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub run_id: u64,
    pub state: TaskState,
    pub progress: f64,
    pub message: String,
    pub paused: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<TaskStatus> for GroupSummary {
    fn from(s: TaskStatus) -> Self {
        Self {
            group: s.group_id,
            run_id: s.run_id,
            state: s.state,
            progress: s.progress,
            message: s.message,
            paused: s.paused,
            started_at: s.started_at,
            finished_at: s.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub status: GroupSummary,
    /// Columns from the last successful cycle, in sheet order.
    pub columns: Vec<EntitySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub group: String,
    pub action: &'static str,
    /// False when the action had nothing to act on (e.g. run while running).
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Domain errors mapped to HTTP statuses.
pub struct ApiError(OddsheetError);

impl From<OddsheetError> for ApiError {
    fn from(e: OddsheetError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OddsheetError::GroupNotFound(_) => StatusCode::NOT_FOUND,
            OddsheetError::SchedulerStopped(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Dashboard request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/groups
pub async fn list_groups(State(scheduler): State<AppState>) -> Json<Vec<GroupSummary>> {
    Json(scheduler.statuses().into_iter().map(GroupSummary::from).collect())
}

/// GET /api/groups/:group
pub async fn get_group(
    State(scheduler): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<GroupDetail>, ApiError> {
    let status = scheduler.status(&group)?;
    let columns = scheduler
        .registry(&group)
        .await?
        .map(|r| r.snapshot())
        .unwrap_or_default();

    Ok(Json(GroupDetail {
        status: status.into(),
        columns,
    }))
}

/// POST /api/groups/:group/run
pub async fn run_group(
    State(scheduler): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let accepted = scheduler.run_once(&group).await?;
    Ok(control(group, "run", accepted))
}

/// POST /api/groups/:group/pause
pub async fn pause_group(
    State(scheduler): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    scheduler.pause(&group).await?;
    Ok(control(group, "pause", true))
}

/// POST /api/groups/:group/resume
pub async fn resume_group(
    State(scheduler): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    scheduler.resume(&group).await?;
    Ok(control(group, "resume", true))
}

/// POST /api/groups/:group/cancel
pub async fn cancel_group(
    State(scheduler): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    let accepted = scheduler.cancel_current(&group).await?;
    Ok(control(group, "cancel", accepted))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

fn control(group: String, action: &'static str, accepted: bool) -> Json<ControlResponse> {
    info!(group = %group, action, accepted, "Dashboard control");
    Json(ControlResponse {
        group,
        action,
        accepted,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
