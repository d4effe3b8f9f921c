//! SecurityAlert entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Alert severities, ordered from least to most serious. The values carry
/// over from the upstream product and are part of its dashboard contract.
pub const SEVERITY_BAIXA: &str = "baixa";
pub const SEVERITY_MEDIA: &str = "media";
pub const SEVERITY_ALTA: &str = "alta";
pub const SEVERITY_CRITICA: &str = "critica";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "security_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub actor_id: String,

    /// One of baixa, media, alta, critica
    pub severity: String,

    /// Alert category (rate_limit, block, unblock)
    pub alert_type: String,

    pub description: String,

    /// Set when an operator acknowledges the alert
    pub resolved: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
