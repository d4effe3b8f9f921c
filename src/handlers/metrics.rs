//! # Metrics API Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::ActorExtension;
use crate::error::ApiError;
use crate::server::AppState;
use crate::stats::ProjectMetrics;

/// Aggregated throughput/error-rate/ETA metrics for a project, recomputed
/// on demand.
#[utoipa::path(
    get,
    path = "/projects/{project_id}/metrics",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Project metrics", body = ProjectMetrics)
    ),
    tag = "metrics"
)]
pub async fn project_metrics(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectMetrics>, ApiError> {
    let metrics = state.metrics.project_metrics(project_id, Utc::now()).await?;
    Ok(Json(metrics))
}
