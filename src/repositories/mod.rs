//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access.

pub mod enrichment_job;
pub mod project_queue_settings;
pub mod schedule;
pub mod security;

pub use enrichment_job::{EnrichmentJobRepository, JobListFilter};
pub use project_queue_settings::ProjectQueueSettingsRepository;
pub use schedule::ScheduleRepository;
pub use security::SecurityRepository;
