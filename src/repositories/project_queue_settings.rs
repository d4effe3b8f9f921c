//! # ProjectQueueSettings Repository
//!
//! Per-project execution knobs with sensible defaults when no row exists.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::project_queue_settings::{ActiveModel, Entity, MODE_SEQUENTIAL, Model};

/// Bounds for the parallel worker pool.
pub const MIN_PARALLEL_JOBS: i32 = 1;
pub const MAX_PARALLEL_JOBS: i32 = 10;

#[derive(Clone)]
pub struct ProjectQueueSettingsRepository {
    db: DatabaseConnection,
}

impl ProjectQueueSettingsRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Settings for a project; defaults (sequential, 3 workers, not paused)
    /// when none were ever stored.
    pub async fn get(&self, project_id: Uuid) -> Result<Model, ApiError> {
        let existing = Entity::find_by_id(project_id)
            .one(&self.db)
            .await
            .map_err(ApiError::from)?;

        Ok(existing.unwrap_or(Model {
            project_id,
            execution_mode: MODE_SEQUENTIAL.to_string(),
            max_parallel_jobs: 3,
            paused: false,
            updated_at: Utc::now().fixed_offset(),
        }))
    }

    /// Upsert settings for a project.
    pub async fn put(
        &self,
        project_id: Uuid,
        execution_mode: &str,
        max_parallel_jobs: i32,
        paused: bool,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let existing = Entity::find_by_id(project_id)
            .one(&self.db)
            .await
            .map_err(ApiError::from)?;

        let model = if let Some(current) = existing {
            let mut active: ActiveModel = current.into();
            active.execution_mode = Set(execution_mode.to_string());
            active.max_parallel_jobs = Set(max_parallel_jobs);
            active.paused = Set(paused);
            active.updated_at = Set(now);
            active.update(&self.db).await.map_err(ApiError::from)?
        } else {
            let active = ActiveModel {
                project_id: Set(project_id),
                execution_mode: Set(execution_mode.to_string()),
                max_parallel_jobs: Set(max_parallel_jobs),
                paused: Set(paused),
                updated_at: Set(now),
            };
            active.insert(&self.db).await.map_err(ApiError::from)?
        };

        tracing::info!(
            project_id = %project_id,
            execution_mode = %model.execution_mode,
            max_parallel_jobs = model.max_parallel_jobs,
            paused = model.paused,
            "Project queue settings updated"
        );

        Ok(model)
    }
}
