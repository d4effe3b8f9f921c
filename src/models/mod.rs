//! # Data Models
//!
//! This module contains all the data models used throughout the enrichment
//! engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod blocked_actor;
pub mod enrichment_job;
pub mod project_queue_settings;
pub mod schedule;
pub mod security_alert;

pub use blocked_actor::Entity as BlockedActor;
pub use enrichment_job::Entity as EnrichmentJob;
pub use project_queue_settings::Entity as ProjectQueueSettings;
pub use schedule::Entity as Schedule;
pub use security_alert::Entity as SecurityAlert;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "enrich".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
