//! EnrichmentJob entity model
//!
//! This module contains the SeaORM entity model for the enrichment_jobs table,
//! which represents one unit of enrichment work (single-record or batch)
//! tracked through its status lifecycle.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Job statuses. Transitions are monotonic except `running <-> paused`;
/// `completed` and `failed` rows are never mutated again.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_PAUSED: &str = "paused";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

/// Job types.
pub const JOB_TYPE_SINGLE: &str = "single";
pub const JOB_TYPE_BATCH: &str = "batch";

/// EnrichmentJob entity representing one unit (or batch) of enrichment work
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "enrichment_jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Project this job belongs to
    pub project_id: Uuid,

    /// Target record for single-record jobs; null for batch jobs
    pub target_record_id: Option<Uuid>,

    /// Actor that requested the work (rate limiting is keyed by this)
    pub actor_id: String,

    /// Type of job (single, batch)
    pub job_type: String,

    /// Current status of the job
    pub status: String,

    /// Priority for claim ordering (0-10, higher first)
    pub priority: i16,

    /// Number of records this job covers
    pub total_count: i32,

    /// Records processed so far (persisted incrementally at record boundaries)
    pub processed_count: i32,

    /// Records enriched successfully
    pub success_count: i32,

    /// Records that exhausted every strategy or failed to load
    pub failure_count: i32,

    /// Retry attempts consumed by external calls on behalf of this job
    pub retry_count: i32,

    /// Message of the most recent error, if any
    pub last_error: Option<String>,

    /// Timestamp when execution first started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job was enqueued
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Terminal jobs are immutable; only deletion removes them.
    pub fn is_terminal(&self) -> bool {
        self.status == STATUS_COMPLETED || self.status == STATUS_FAILED
    }
}
