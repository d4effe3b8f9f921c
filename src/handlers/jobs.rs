//! # Jobs API Handlers
//!
//! Enqueue, inspect, pause/resume, and cancel enrichment jobs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::ActorExtension;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::enrichment_job::{
    JOB_TYPE_BATCH, JOB_TYPE_SINGLE, Model, STATUS_COMPLETED, STATUS_FAILED, STATUS_PAUSED,
    STATUS_PENDING, STATUS_RUNNING,
};
use crate::repositories::JobListFilter;
use crate::server::AppState;

const ENQUEUE_ENDPOINT: &str = "jobs:create";

const KNOWN_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_RUNNING,
    STATUS_PAUSED,
    STATUS_COMPLETED,
    STATUS_FAILED,
];

/// Request payload for enqueueing a job.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Project the job belongs to
    pub project_id: Uuid,
    /// Target record for a single-record job; omit for a batch job over the
    /// whole project
    pub target_record_id: Option<Uuid>,
    /// Priority 0-10, higher runs first (default 0)
    pub priority: Option<i16>,
    /// Cap on records covered by a batch job
    pub max_records: Option<u32>,
}

/// Job information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    pub project_id: String,
    pub target_record_id: Option<String>,
    pub job_type: String,
    #[schema(example = "pending")]
    pub status: String,
    pub priority: i16,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<Model> for JobInfo {
    fn from(model: Model) -> Self {
        Self {
            id: model.id.to_string(),
            project_id: model.project_id.to_string(),
            target_record_id: model.target_record_id.map(|id| id.to_string()),
            job_type: model.job_type,
            status: model.status,
            priority: model.priority,
            total_count: model.total_count,
            processed_count: model.processed_count,
            success_count: model.success_count,
            failure_count: model.failure_count,
            retry_count: model.retry_count,
            last_error: model.last_error,
            created_at: model.created_at.to_rfc3339(),
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub project_id: Option<Uuid>,
    /// Filter by status (pending, running, paused, completed, failed)
    pub status: Option<String>,
    /// Jobs created at or after this RFC3339 timestamp
    pub created_after: Option<String>,
    /// Jobs created at or before this RFC3339 timestamp
    pub created_before: Option<String>,
    /// Maximum number of jobs to return (default 50, max 100)
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<JobInfo>,
}

/// Enqueue a single-record or batch job.
#[utoipa::path(
    post,
    path = "/jobs",
    security(("bearer_auth" = [])),
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job enqueued", body = JobInfo),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    ActorExtension(actor): ActorExtension,
    Json(payload): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let decision = state
        .limiter
        .check_and_increment(&actor.id, ENQUEUE_ENDPOINT)
        .await?;
    if !decision.allowed {
        let retry_after = (decision.reset_at - Utc::now()).num_seconds().max(1) as u64;
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded for job creation",
        )
        .with_retry_after(retry_after));
    }

    let priority = payload.priority.unwrap_or(0);
    if !(0..=10).contains(&priority) {
        return Err(validation_error(
            "Invalid priority",
            serde_json::json!({ "priority": "Must be between 0 and 10" }),
        ));
    }

    let job = if let Some(record_id) = payload.target_record_id {
        // Surface unknown records at enqueue time instead of as a failed run.
        state.records.load(record_id).await.map_err(|_| {
            validation_error(
                "Unknown target record",
                serde_json::json!({ "target_record_id": "No such record" }),
            )
        })?;

        state
            .jobs
            .enqueue(
                payload.project_id,
                Some(record_id),
                &actor.id,
                JOB_TYPE_SINGLE,
                priority,
                1,
            )
            .await?
    } else {
        let count = state
            .records
            .count_project_records(payload.project_id)
            .await
            .map_err(|err| ApiError::from(anyhow::anyhow!(err)))?;

        let total = match payload.max_records {
            Some(cap) if cap > 0 => count.min(cap as usize),
            _ => count,
        };

        if total == 0 {
            return Err(validation_error(
                "Nothing to enrich",
                serde_json::json!({ "project_id": "Project has no records" }),
            ));
        }

        state
            .jobs
            .enqueue(
                payload.project_id,
                None,
                &actor.id,
                JOB_TYPE_BATCH,
                priority,
                total as i32,
            )
            .await?
    };

    Ok((StatusCode::CREATED, Json(job.into())))
}

/// List jobs with filters.
#[utoipa::path(
    get,
    path = "/jobs",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Jobs matching the query", body = JobsResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    if let Some(status) = &params.status
        && !KNOWN_STATUSES.contains(&status.as_str())
    {
        return Err(validation_error(
            "Invalid status filter",
            serde_json::json!({ "status": format!("Must be one of {:?}", KNOWN_STATUSES) }),
        ));
    }

    let limit = params.limit.unwrap_or(50);
    if limit > 100 {
        return Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": "Maximum allowed limit is 100" }),
        ));
    }

    let filter = JobListFilter {
        project_id: params.project_id,
        status: params.status,
        created_after: parse_timestamp(params.created_after.as_deref(), "created_after")?,
        created_before: parse_timestamp(params.created_before.as_deref(), "created_before")?,
        limit,
        offset: params.offset.unwrap_or(0),
    };

    let jobs = state.jobs.list(filter).await?;
    Ok(Json(JobsResponse {
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
    }))
}

/// Fetch one job.
pub async fn get_job(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobInfo>, ApiError> {
    let job = state
        .jobs
        .find(job_id)
        .await?
        .ok_or_else(|| not_found("Job not found"))?;

    Ok(Json(job.into()))
}

/// Request a pause at the job's next record boundary.
#[utoipa::path(
    post,
    path = "/jobs/{job_id}/pause",
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Pause requested"),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 409, description = "Job is not running", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn pause_job(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let job = state
        .jobs
        .find(job_id)
        .await?
        .ok_or_else(|| not_found("Job not found"))?;

    if job.status != STATUS_RUNNING || !state.executor.request_pause(job_id) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Job is not running",
        ));
    }

    Ok(StatusCode::ACCEPTED)
}

/// Resume a paused job from its persisted progress.
#[utoipa::path(
    post,
    path = "/jobs/{job_id}/resume",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Job resumed", body = JobInfo),
        (status = 404, description = "Job not found", body = ApiError),
        (status = 409, description = "Job is not paused", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn resume_job(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobInfo>, ApiError> {
    state
        .jobs
        .find(job_id)
        .await?
        .ok_or_else(|| not_found("Job not found"))?;

    match state.executor.resume(job_id).await? {
        Some(job) => Ok(Json(job.into())),
        None => Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "Job is not paused",
        )),
    }
}

/// Cancel a job: pending and terminal jobs are deleted immediately, running
/// jobs are stopped at their next record boundary.
#[utoipa::path(
    delete,
    path = "/jobs/{job_id}",
    security(("bearer_auth" = [])),
    responses(
        (status = 202, description = "Stop requested for running job"),
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let job = state
        .jobs
        .find(job_id)
        .await?
        .ok_or_else(|| not_found("Job not found"))?;

    if job.status == STATUS_RUNNING {
        if state.executor.request_stop(job_id) {
            return Ok(StatusCode::ACCEPTED);
        }
        // Orphaned running row without a live runner; safe to drop.
    }

    state.jobs.delete(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearFinishedResponse {
    pub deleted: u64,
}

/// Queue maintenance: delete a project's completed and failed jobs.
pub async fn clear_finished_jobs(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ClearFinishedResponse>, ApiError> {
    let deleted = state.jobs.clear_finished(project_id).await?;
    Ok(Json(ClearFinishedResponse { deleted }))
}

fn parse_timestamp(
    value: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    validation_error(
                        "Invalid timestamp",
                        serde_json::json!({ field: "Must be RFC3339" }),
                    )
                })
        })
        .transpose()
}
