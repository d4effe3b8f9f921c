//! # Schedule Repository
//!
//! Repository operations for the schedules table. The `pending -> running`
//! transition is a conditional update so overlapping sweeps can never fire
//! the same schedule twice.

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::schedule::{
    ActiveModel, Column, Entity, Model, RECURRENCE_ONCE, STATUS_CANCELLED, STATUS_COMPLETED,
    STATUS_ERROR, STATUS_PENDING, STATUS_RUNNING,
};

/// Repository for schedule database operations
#[derive(Clone)]
pub struct ScheduleRepository {
    db: DatabaseConnection,
}

impl ScheduleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new pending schedule.
    pub async fn create(
        &self,
        project_id: Uuid,
        actor_id: &str,
        scheduled_at: DateTime<Utc>,
        recurrence: &str,
        batch_size: i32,
        max_records: Option<i32>,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let schedule = ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            actor_id: Set(actor_id.to_string()),
            scheduled_at: Set(scheduled_at.fixed_offset()),
            recurrence: Set(recurrence.to_string()),
            batch_size: Set(batch_size),
            max_records: Set(max_records),
            status: Set(STATUS_PENDING.to_string()),
            last_run_at: Set(None),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = schedule.insert(&self.db).await.map_err(ApiError::from)?;

        tracing::info!(
            schedule_id = %result.id,
            project_id = %project_id,
            recurrence = %result.recurrence,
            scheduled_at = %result.scheduled_at,
            "Schedule created"
        );

        Ok(result)
    }

    pub async fn find(&self, schedule_id: Uuid) -> Result<Option<Model>, ApiError> {
        Entity::find_by_id(schedule_id)
            .one(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// List schedules, optionally for one project, soonest first.
    pub async fn list(&self, project_id: Option<Uuid>) -> Result<Vec<Model>, ApiError> {
        let mut query = Entity::find().order_by_asc(Column::ScheduledAt);

        if let Some(project_id) = project_id {
            query = query.filter(Column::ProjectId.eq(project_id));
        }

        query.all(&self.db).await.map_err(ApiError::from)
    }

    /// Pending schedules whose fire time has passed, oldest first.
    pub async fn due(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::Status.eq(STATUS_PENDING))
            .filter(Column::ScheduledAt.lte(now))
            .order_by_asc(Column::ScheduledAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// Try to move a schedule from `pending` to `running`. Returns false if
    /// another sweep already claimed it.
    pub async fn try_mark_running(&self, schedule_id: Uuid) -> Result<bool, ApiError> {
        let now = Utc::now().fixed_offset();
        let update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_RUNNING))
            .col_expr(Column::LastRunAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(schedule_id))
            .filter(Column::Status.eq(STATUS_PENDING))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;

        Ok(update.rows_affected == 1)
    }

    /// Record the outcome of a fire: `once` schedules complete, recurring
    /// schedules get the provided next fire time and return to `pending`.
    pub async fn finish_fire(
        &self,
        schedule: &Model,
        next_scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = schedule.clone().into();

        if schedule.recurrence == RECURRENCE_ONCE {
            active.status = Set(STATUS_COMPLETED.to_string());
        } else {
            let next = next_scheduled_at.ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "recurring schedule finished without a next fire time",
                )
            })?;
            active.scheduled_at = Set(next.fixed_offset());
            active.status = Set(STATUS_PENDING.to_string());
        }

        active.updated_at = Set(now);
        active.update(&self.db).await.map_err(ApiError::from)?;
        Ok(())
    }

    /// Record a firing error. A human resolves these; the sweep never
    /// silently retries them.
    pub async fn mark_error(&self, schedule_id: Uuid, message: &str) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_ERROR))
            .col_expr(Column::LastError, Expr::value(message))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(schedule_id))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Cancel a pending schedule. Running schedules must finish their fire
    /// first; the conditional update rejects them.
    pub async fn cancel(&self, schedule_id: Uuid) -> Result<bool, ApiError> {
        let now = Utc::now().fixed_offset();
        let update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_CANCELLED))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(schedule_id))
            .filter(Column::Status.eq(STATUS_PENDING))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;

        Ok(update.rows_affected == 1)
    }

    pub async fn delete(&self, schedule_id: Uuid) -> Result<bool, ApiError> {
        let result = Entity::delete_by_id(schedule_id)
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(result.rows_affected == 1)
    }
}
