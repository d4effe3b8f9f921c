//! # EnrichmentJob Repository
//!
//! Repository operations for the enrichment_jobs table, including the
//! conditional claim that moves a job from `pending` to `running`. The claim
//! doubles as the mutual-exclusion gate: whichever caller's UPDATE matches
//! the still-pending row wins.

use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::enrichment_job::{
    ActiveModel, Column, Entity, Model, STATUS_COMPLETED, STATUS_FAILED, STATUS_PAUSED,
    STATUS_PENDING, STATUS_RUNNING,
};

/// Repository for enrichment job database operations
#[derive(Clone)]
pub struct EnrichmentJobRepository {
    db: DatabaseConnection,
}

/// Filters accepted by [`EnrichmentJobRepository::list`].
#[derive(Debug, Default, Clone)]
pub struct JobListFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<String>,
    pub created_after: Option<chrono::DateTime<Utc>>,
    pub created_before: Option<chrono::DateTime<Utc>>,
    pub limit: u64,
    pub offset: u64,
}

impl EnrichmentJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue a new job in `pending` status.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        project_id: Uuid,
        target_record_id: Option<Uuid>,
        actor_id: &str,
        job_type: &str,
        priority: i16,
        total_count: i32,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            target_record_id: Set(target_record_id),
            actor_id: Set(actor_id.to_string()),
            job_type: Set(job_type.to_string()),
            status: Set(STATUS_PENDING.to_string()),
            priority: Set(priority),
            total_count: Set(total_count),
            processed_count: Set(0),
            success_count: Set(0),
            failure_count: Set(0),
            retry_count: Set(0),
            last_error: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = job.insert(&self.db).await.map_err(ApiError::from)?;

        tracing::info!(
            job_id = %result.id,
            project_id = %project_id,
            job_type = %result.job_type,
            priority = result.priority,
            "Enrichment job enqueued"
        );

        Ok(result)
    }

    /// Find a job by id.
    pub async fn find(&self, job_id: Uuid) -> Result<Option<Model>, ApiError> {
        Entity::find_by_id(job_id)
            .one(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// List jobs with optional filtering, newest first.
    pub async fn list(&self, filter: JobListFilter) -> Result<Vec<Model>, ApiError> {
        let mut query = Entity::find().order_by_desc(Column::CreatedAt);

        if let Some(project_id) = filter.project_id {
            query = query.filter(Column::ProjectId.eq(project_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(after) = filter.created_after {
            query = query.filter(Column::CreatedAt.gte(after));
        }
        if let Some(before) = filter.created_before {
            query = query.filter(Column::CreatedAt.lte(before));
        }

        let limit = if filter.limit == 0 { 50 } else { filter.limit };

        query
            .offset(filter.offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// Distinct project ids with pending work.
    pub async fn projects_with_pending_jobs(&self) -> Result<Vec<Uuid>, ApiError> {
        Entity::find()
            .select_only()
            .column(Column::ProjectId)
            .filter(Column::Status.eq(STATUS_PENDING))
            .distinct()
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// Number of jobs currently running for a project.
    pub async fn running_count(&self, project_id: Uuid) -> Result<u64, ApiError> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Status.eq(STATUS_RUNNING))
            .count(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// Claim the next eligible pending job for a project: highest priority
    /// first, then FIFO. Jobs whose target record appears in `locked_records`
    /// are skipped. Returns the claimed job, now `running`.
    pub async fn claim_next(
        &self,
        project_id: Uuid,
        locked_records: &[Uuid],
    ) -> Result<Option<Model>, ApiError> {
        let candidates = Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Status.eq(STATUS_PENDING))
            .order_by_desc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .limit(16)
            .all(&self.db)
            .await
            .map_err(ApiError::from)?;

        for candidate in candidates {
            if let Some(record_id) = candidate.target_record_id
                && locked_records.contains(&record_id)
            {
                continue;
            }

            let now = Utc::now().fixed_offset();
            let update = Entity::update_many()
                .col_expr(Column::Status, Expr::value(STATUS_RUNNING))
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::Id.eq(candidate.id))
                .filter(Column::Status.eq(STATUS_PENDING))
                .exec(&self.db)
                .await
                .map_err(ApiError::from)?;

            if update.rows_affected == 1 {
                // started_at survives pause/resume cycles.
                if candidate.started_at.is_none() {
                    let mut active: ActiveModel = candidate.clone().into();
                    active.started_at = Set(Some(now));
                    active.status = Set(STATUS_RUNNING.to_string());
                    active.update(&self.db).await.map_err(ApiError::from)?;
                }
                return self.find(candidate.id).await;
            }
        }

        Ok(None)
    }

    /// Move a paused job back to `running` (user resume).
    pub async fn mark_resumed(&self, job_id: Uuid) -> Result<Option<Model>, ApiError> {
        let now = Utc::now().fixed_offset();
        let update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_RUNNING))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(STATUS_PAUSED))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;

        if update.rows_affected == 1 {
            self.find(job_id).await
        } else {
            Ok(None)
        }
    }

    /// Persist a pause requested at a record boundary.
    pub async fn mark_paused(&self, job_id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PAUSED))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(STATUS_RUNNING))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Persist incremental progress counters at a record boundary.
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        processed: i32,
        success: i32,
        failure: i32,
        retries: i32,
        last_error: Option<String>,
    ) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        let mut update = Entity::update_many()
            .col_expr(Column::ProcessedCount, Expr::value(processed))
            .col_expr(Column::SuccessCount, Expr::value(success))
            .col_expr(Column::FailureCount, Expr::value(failure))
            .col_expr(Column::RetryCount, Expr::value(retries))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(message) = last_error {
            update = update.col_expr(Column::LastError, Expr::value(message));
        }

        update
            .filter(Column::Id.eq(job_id))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Move a running job to a terminal status.
    pub async fn mark_finished(
        &self,
        job_id: Uuid,
        status: &str,
        last_error: Option<String>,
    ) -> Result<(), ApiError> {
        debug_assert!(status == STATUS_COMPLETED || status == STATUS_FAILED);

        let now = Utc::now().fixed_offset();
        let mut update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status))
            .col_expr(Column::CompletedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if let Some(message) = last_error {
            update = update.col_expr(Column::LastError, Expr::value(message));
        }

        update
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.is_in([STATUS_RUNNING, STATUS_PENDING]))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Put one running job back to `pending`, keeping its progress counters.
    pub async fn requeue(&self, job_id: Uuid) -> Result<(), ApiError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PENDING))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(STATUS_RUNNING))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Requeue jobs left `running` by an unclean shutdown. Progress counters
    /// are kept, so execution resumes from `processed_count`.
    pub async fn requeue_orphaned_running(&self) -> Result<u64, ApiError> {
        let now = Utc::now().fixed_offset();
        let update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PENDING))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(STATUS_RUNNING))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(update.rows_affected)
    }

    /// Delete a job row. Terminal and pending rows only; running jobs are
    /// stopped through their cancel flag first.
    pub async fn delete(&self, job_id: Uuid) -> Result<bool, ApiError> {
        let result = Entity::delete_by_id(job_id)
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(result.rows_affected == 1)
    }

    /// Jobs of one status for a project that finished at or after `since`.
    pub async fn finished_since(
        &self,
        project_id: Uuid,
        status: &str,
        since: chrono::DateTime<Utc>,
    ) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Status.eq(status))
            .filter(Column::CompletedAt.gte(since))
            .all(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// A project's currently running jobs.
    pub async fn running_jobs(&self, project_id: Uuid) -> Result<Vec<Model>, ApiError> {
        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Status.eq(STATUS_RUNNING))
            .all(&self.db)
            .await
            .map_err(ApiError::from)
    }

    /// Queue maintenance: drop a project's terminal jobs.
    pub async fn clear_finished(&self, project_id: Uuid) -> Result<u64, ApiError> {
        let result = Entity::delete_many()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Status.is_in([STATUS_COMPLETED, STATUS_FAILED]))
            .exec(&self.db)
            .await
            .map_err(ApiError::from)?;
        Ok(result.rows_affected)
    }
}
