//! Schedule entity model
//!
//! This module contains the SeaORM entity model for the schedules table,
//! which represents persisted triggers that materialize batch jobs at due
//! time, optionally recurring.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_ERROR: &str = "error";

pub const RECURRENCE_ONCE: &str = "once";
pub const RECURRENCE_DAILY: &str = "daily";
pub const RECURRENCE_WEEKLY: &str = "weekly";

/// Schedule entity representing a trigger that produces jobs
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
    /// Unique identifier for the schedule (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Project whose records the fired jobs will enrich
    pub project_id: Uuid,

    /// Actor the fired jobs run on behalf of
    pub actor_id: String,

    /// Next fire time
    pub scheduled_at: DateTimeWithTimeZone,

    /// Recurrence (once, daily, weekly)
    pub recurrence: String,

    /// Batch size passed to fired jobs
    pub batch_size: i32,

    /// Optional cap on records covered per fire
    pub max_records: Option<i32>,

    /// Current status of the schedule
    pub status: String,

    /// Timestamp of the most recent fire
    pub last_run_at: Option<DateTimeWithTimeZone>,

    /// Message of the most recent firing error, if any
    pub last_error: Option<String>,

    /// Timestamp when the schedule was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the schedule was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
