//! # Project Queue Settings Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::ActorExtension;
use crate::error::{ApiError, validation_error};
use crate::models::project_queue_settings::{MODE_PARALLEL, MODE_SEQUENTIAL, Model};
use crate::repositories::project_queue_settings::{MAX_PARALLEL_JOBS, MIN_PARALLEL_JOBS};
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueSettingsInfo {
    pub project_id: String,
    /// sequential or parallel
    pub execution_mode: String,
    /// Worker pool size in parallel mode (1-10)
    pub max_parallel_jobs: i32,
    /// Whether job admission is paused project-wide
    pub paused: bool,
}

impl From<Model> for QueueSettingsInfo {
    fn from(model: Model) -> Self {
        Self {
            project_id: model.project_id.to_string(),
            execution_mode: model.execution_mode,
            max_parallel_jobs: model.max_parallel_jobs,
            paused: model.paused,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PutQueueSettingsRequest {
    pub execution_mode: String,
    pub max_parallel_jobs: Option<i32>,
    pub paused: Option<bool>,
}

/// Fetch a project's execution settings (defaults when never configured).
#[utoipa::path(
    get,
    path = "/projects/{project_id}/queue-settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Queue settings", body = QueueSettingsInfo)
    ),
    tag = "projects"
)]
pub async fn get_queue_settings(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(project_id): Path<Uuid>,
) -> Result<Json<QueueSettingsInfo>, ApiError> {
    let settings = state.settings.get(project_id).await?;
    Ok(Json(settings.into()))
}

/// Update a project's execution mode, worker pool size, and pause flag.
#[utoipa::path(
    put,
    path = "/projects/{project_id}/queue-settings",
    security(("bearer_auth" = [])),
    request_body = PutQueueSettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = QueueSettingsInfo),
        (status = 400, description = "Invalid request", body = ApiError)
    ),
    tag = "projects"
)]
pub async fn put_queue_settings(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<PutQueueSettingsRequest>,
) -> Result<Json<QueueSettingsInfo>, ApiError> {
    if payload.execution_mode != MODE_SEQUENTIAL && payload.execution_mode != MODE_PARALLEL {
        return Err(validation_error(
            "Invalid execution mode",
            serde_json::json!({ "execution_mode": "Must be sequential or parallel" }),
        ));
    }

    let max_parallel_jobs = payload.max_parallel_jobs.unwrap_or(3);
    if !(MIN_PARALLEL_JOBS..=MAX_PARALLEL_JOBS).contains(&max_parallel_jobs) {
        return Err(validation_error(
            "Invalid worker pool size",
            serde_json::json!({
                "max_parallel_jobs":
                    format!("Must be between {MIN_PARALLEL_JOBS} and {MAX_PARALLEL_JOBS}")
            }),
        ));
    }

    let settings = state
        .settings
        .put(
            project_id,
            &payload.execution_mode,
            max_parallel_jobs,
            payload.paused.unwrap_or(false),
        )
        .await?;

    Ok(Json(settings.into()))
}
