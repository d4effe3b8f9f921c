//! ProjectQueueSettings entity model
//!
//! Per-project execution knobs: sequential vs bounded-parallel mode, worker
//! pool size, and the project-wide pause flag.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

pub const MODE_SEQUENTIAL: &str = "sequential";
pub const MODE_PARALLEL: &str = "parallel";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "project_queue_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project_id: Uuid,

    /// Execution discipline (sequential, parallel)
    pub execution_mode: String,

    /// Worker pool size in parallel mode (1-10)
    pub max_parallel_jobs: i32,

    /// When set, no job of this project is admitted
    pub paused: bool,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
