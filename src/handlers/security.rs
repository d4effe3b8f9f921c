//! # Security API Handlers
//!
//! Alert listing/resolution and manual block management for the rate
//! limiter subsystem. Block removal is restricted to administrative actors.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::ActorExtension;
use crate::error::{ApiError, forbidden, not_found};
use crate::models::blocked_actor::Model as BlockedActorModel;
use crate::models::security_alert::Model as SecurityAlertModel;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SecurityAlertInfo {
    pub id: String,
    pub actor_id: String,
    pub severity: String,
    pub alert_type: String,
    pub description: String,
    pub resolved: bool,
    pub created_at: String,
}

impl From<SecurityAlertModel> for SecurityAlertInfo {
    fn from(model: SecurityAlertModel) -> Self {
        Self {
            id: model.id.to_string(),
            actor_id: model.actor_id,
            severity: model.severity,
            alert_type: model.alert_type,
            description: model.description,
            resolved: model.resolved,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlockedActorInfo {
    pub actor_id: String,
    pub reason: String,
    pub blocked_at: String,
    pub blocked_until: String,
}

impl From<BlockedActorModel> for BlockedActorInfo {
    fn from(model: BlockedActorModel) -> Self {
        Self {
            actor_id: model.actor_id,
            reason: model.reason,
            blocked_at: model.blocked_at.to_rfc3339(),
            blocked_until: model.blocked_until.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    /// Only unresolved alerts (default false)
    pub unresolved_only: Option<bool>,
    /// Maximum alerts to return (default 100)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsResponse {
    pub alerts: Vec<SecurityAlertInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BlocksResponse {
    pub blocks: Vec<BlockedActorInfo>,
}

/// List security alerts, newest first.
pub async fn list_alerts(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Query(params): Query<ListAlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let alerts = state
        .security
        .list_alerts(
            params.unresolved_only.unwrap_or(false),
            params.limit.unwrap_or(100).min(500),
        )
        .await?;

    Ok(Json(AlertsResponse {
        alerts: alerts.into_iter().map(SecurityAlertInfo::from).collect(),
    }))
}

/// Acknowledge one alert.
pub async fn resolve_alert(
    State(state): State<AppState>,
    _actor: ActorExtension,
    Path(alert_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.security.resolve_alert(alert_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Alert not found"))
    }
}

/// List currently blocked actors.
pub async fn list_blocks(
    State(state): State<AppState>,
    _actor: ActorExtension,
) -> Result<Json<BlocksResponse>, ApiError> {
    let blocks = state.security.list_blocks(Utc::now()).await?;
    Ok(Json(BlocksResponse {
        blocks: blocks.into_iter().map(BlockedActorInfo::from).collect(),
    }))
}

/// Manually lift an actor's hard block. Admin only.
#[utoipa::path(
    delete,
    path = "/security/blocks/{actor_id}",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Block removed"),
        (status = 403, description = "Caller is not an administrator", body = ApiError),
        (status = 404, description = "No active block for actor", body = ApiError)
    ),
    tag = "security"
)]
pub async fn unblock_actor(
    State(state): State<AppState>,
    ActorExtension(actor): ActorExtension,
    Path(actor_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !actor.is_admin {
        return Err(forbidden(Some("Only administrators can remove blocks")));
    }

    if state.limiter.unblock(&actor_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("No block for that actor"))
    }
}
