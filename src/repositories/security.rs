//! # Security Repository
//!
//! Persistence for the rate limiter subsystem: hard actor blocks and the
//! security alert audit trail.

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::blocked_actor::{
    ActiveModel as BlockedActorActiveModel, Column as BlockedActorColumn, Entity as BlockedActor,
    Model as BlockedActorModel,
};
use crate::models::security_alert::{
    ActiveModel as SecurityAlertActiveModel, Column as SecurityAlertColumn, Entity as SecurityAlert,
    Model as SecurityAlertModel,
};

#[derive(Clone)]
pub struct SecurityRepository {
    db: DatabaseConnection,
}

impl SecurityRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The active block for an actor, if its cooldown has not elapsed.
    pub async fn active_block(
        &self,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockedActorModel>, ApiError> {
        let block = BlockedActor::find_by_id(actor_id)
            .one(&self.db)
            .await
            .map_err(ApiError::from)?;

        Ok(block.filter(|block| block.blocked_until.with_timezone(&Utc) > now))
    }

    /// Block an actor until `blocked_until`, replacing any previous block.
    pub async fn upsert_block(
        &self,
        actor_id: &str,
        reason: &str,
        blocked_until: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();

        // Replace-then-insert keeps this portable across Postgres and SQLite.
        BlockedActor::delete_by_id(actor_id)
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;

        let block = BlockedActorActiveModel {
            actor_id: Set(actor_id.to_string()),
            reason: Set(reason.to_string()),
            blocked_at: Set(now),
            blocked_until: Set(blocked_until.fixed_offset()),
        };
        block.insert(&self.db).await.map_err(ApiError::from)?;

        tracing::warn!(
            actor_id = %actor_id,
            blocked_until = %blocked_until,
            reason = %reason,
            "Actor hard-blocked"
        );

        Ok(())
    }

    /// Lift an actor's block. Returns false when no block existed.
    pub async fn remove_block(&self, actor_id: &str) -> Result<bool, ApiError> {
        let result = BlockedActor::delete_by_id(actor_id)
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(result.rows_affected == 1)
    }

    /// Append a security alert.
    pub async fn insert_alert(
        &self,
        actor_id: &str,
        severity: &str,
        alert_type: &str,
        description: &str,
    ) -> Result<SecurityAlertModel, ApiError> {
        let alert = SecurityAlertActiveModel {
            id: Set(Uuid::new_v4()),
            actor_id: Set(actor_id.to_string()),
            severity: Set(severity.to_string()),
            alert_type: Set(alert_type.to_string()),
            description: Set(description.to_string()),
            resolved: Set(false),
            created_at: Set(Utc::now().fixed_offset()),
        };

        alert.insert(&self.db).await.map_err(ApiError::from)
    }

    /// List alerts, newest first, optionally only unresolved ones.
    pub async fn list_alerts(
        &self,
        unresolved_only: bool,
        limit: u64,
    ) -> Result<Vec<SecurityAlertModel>, ApiError> {
        let mut query = SecurityAlert::find().order_by_desc(SecurityAlertColumn::CreatedAt);

        if unresolved_only {
            query = query.filter(SecurityAlertColumn::Resolved.eq(false));
        }

        query.limit(limit).all(&self.db).await.map_err(ApiError::from)
    }

    /// Mark an alert resolved. Returns false for unknown ids.
    pub async fn resolve_alert(&self, alert_id: Uuid) -> Result<bool, ApiError> {
        let update = SecurityAlert::update_many()
            .col_expr(SecurityAlertColumn::Resolved, Expr::value(true))
            .filter(SecurityAlertColumn::Id.eq(alert_id))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;

        Ok(update.rows_affected == 1)
    }

    /// Alerts recorded for one actor since `since` (violation escalation
    /// window checks).
    pub async fn alert_count_since(
        &self,
        actor_id: &str,
        alert_type: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, ApiError> {
        use sea_orm::PaginatorTrait;

        SecurityAlert::find()
            .filter(SecurityAlertColumn::ActorId.eq(actor_id))
            .filter(SecurityAlertColumn::AlertType.eq(alert_type))
            .filter(SecurityAlertColumn::CreatedAt.gte(since))
            .count(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// All currently blocked actors.
    pub async fn list_blocks(&self, now: DateTime<Utc>) -> Result<Vec<BlockedActorModel>, ApiError> {
        BlockedActor::find()
            .filter(BlockedActorColumn::BlockedUntil.gt(now))
            .order_by_desc(BlockedActorColumn::BlockedAt)
            .all(&self.db)
            .await
            .map_err(ApiError::from)
    }
}
