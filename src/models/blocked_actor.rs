//! BlockedActor entity model
//!
//! A hard block applied by the security monitor after repeated rate-limit
//! violations. While `blocked_until` is in the future every call from the
//! actor is denied, independent of per-endpoint counters.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "blocked_actors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub actor_id: String,

    /// Human-readable reason recorded at block time
    pub reason: String,

    pub blocked_at: DateTimeWithTimeZone,

    /// Block expiry; requests are denied unconditionally until then
    pub blocked_until: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
