//! Database migrations for the enrichment engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_100000_create_enrichment_jobs;
mod m2025_06_01_100100_create_schedules;
mod m2025_06_01_100200_create_project_queue_settings;
mod m2025_06_01_100300_create_security_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_100000_create_enrichment_jobs::Migration),
            Box::new(m2025_06_01_100100_create_schedules::Migration),
            Box::new(m2025_06_01_100200_create_project_queue_settings::Migration),
            Box::new(m2025_06_01_100300_create_security_tables::Migration),
        ]
    }
}
