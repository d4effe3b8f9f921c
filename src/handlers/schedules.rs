//! # Schedules API Handlers
//!
//! Create, list, cancel, and delete enrichment schedules.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::ActorExtension;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::schedule::{
    Model, RECURRENCE_DAILY, RECURRENCE_ONCE, RECURRENCE_WEEKLY, STATUS_RUNNING,
};
use crate::server::AppState;

const KNOWN_RECURRENCES: &[&str] = &[RECURRENCE_ONCE, RECURRENCE_DAILY, RECURRENCE_WEEKLY];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScheduleRequest {
    pub project_id: Uuid,
    /// First fire time, RFC3339
    #[schema(example = "2025-06-01T10:00:00Z")]
    pub scheduled_at: String,
    /// one of: once, daily, weekly (default once)
    pub recurrence: Option<String>,
    /// Batch size passed to fired jobs (default 50)
    pub batch_size: Option<u32>,
    /// Optional cap on records per fire
    pub max_records: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduleInfo {
    pub id: String,
    pub project_id: String,
    pub scheduled_at: String,
    pub recurrence: String,
    pub batch_size: i32,
    pub max_records: Option<i32>,
    pub status: String,
    pub last_run_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
}

impl From<Model> for ScheduleInfo {
    fn from(model: Model) -> Self {
        Self {
            id: model.id.to_string(),
            project_id: model.project_id.to_string(),
            scheduled_at: model.scheduled_at.to_rfc3339(),
            recurrence: model.recurrence,
            batch_size: model.batch_size,
            max_records: model.max_records,
            status: model.status,
            last_run_at: model.last_run_at.map(|dt| dt.to_rfc3339()),
            last_error: model.last_error,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSchedulesQuery {
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SchedulesResponse {
    pub schedules: Vec<ScheduleInfo>,
}

/// Create a schedule.
#[utoipa::path(
    post,
    path = "/schedules",
    security(("bearer_auth" = [])),
    request_body = CreateScheduleRequest,
    responses(
        (status = 201, description = "Schedule created", body = ScheduleInfo),
        (status = 400, description = "Invalid request", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    ActorExtension(actor): ActorExtension,
    Json(payload): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleInfo>), ApiError> {
    let scheduled_at = DateTime::parse_from_rfc3339(&payload.scheduled_at)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|_| {
            validation_error(
                "Invalid fire time",
                serde_json::json!({ "scheduled_at": "Must be RFC3339" }),
            )
        })?;

    let recurrence = payload
        .recurrence
        .unwrap_or_else(|| RECURRENCE_ONCE.to_string());
    if !KNOWN_RECURRENCES.contains(&recurrence.as_str()) {
        return Err(validation_error(
            "Invalid recurrence",
            serde_json::json!({ "recurrence": format!("Must be one of {:?}", KNOWN_RECURRENCES) }),
        ));
    }

    let batch_size = payload.batch_size.unwrap_or(50);
    if batch_size == 0 {
        return Err(validation_error(
            "Invalid batch size",
            serde_json::json!({ "batch_size": "Must be positive" }),
        ));
    }

    let schedule = state
        .schedules
        .create(
            payload.project_id,
            &actor.id,
            scheduled_at,
            &recurrence,
            batch_size as i32,
            payload.max_records.map(|cap| cap as i32),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(schedule.into())))
}

/// List schedules, soonest first.
#[utoipa::path(
    get,
    path = "/schedules",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Schedules", body = SchedulesResponse)
    ),
    tag = "schedules"
)]
pub async fn list_schedules(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Query(params): Query<ListSchedulesQuery>,
) -> Result<Json<SchedulesResponse>, ApiError> {
    let schedules = state.schedules.list(params.project_id).await?;
    Ok(Json(SchedulesResponse {
        schedules: schedules.into_iter().map(ScheduleInfo::from).collect(),
    }))
}

/// Cancel a pending schedule. A schedule mid-fire must finish first.
#[utoipa::path(
    post,
    path = "/schedules/{schedule_id}/cancel",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Schedule cancelled", body = ScheduleInfo),
        (status = 404, description = "Schedule not found", body = ApiError),
        (status = 409, description = "Schedule is not pending", body = ApiError)
    ),
    tag = "schedules"
)]
pub async fn cancel_schedule(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ScheduleInfo>, ApiError> {
    state
        .schedules
        .find(schedule_id)
        .await?
        .ok_or_else(|| not_found("Schedule not found"))?;

    if !state.schedules.cancel(schedule_id).await? {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Only pending schedules can be cancelled",
        ));
    }

    let schedule = state
        .schedules
        .find(schedule_id)
        .await?
        .ok_or_else(|| not_found("Schedule not found"))?;

    Ok(Json(schedule.into()))
}

/// Delete a schedule that is not mid-fire.
pub async fn delete_schedule(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(schedule_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let schedule = state
        .schedules
        .find(schedule_id)
        .await?
        .ok_or_else(|| not_found("Schedule not found"))?;

    if schedule.status == STATUS_RUNNING {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Schedule is firing; wait for it to finish",
        ));
    }

    state.schedules.delete(schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
