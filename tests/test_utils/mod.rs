//! Test utilities for database-backed engine tests.
//!
//! Provides an in-memory SQLite database with all migrations applied and a
//! baseline configuration accepted by the engine's validation.

use anyhow::Result;
use enrich::config::{ActorToken, AppConfig};
use enrich::migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Baseline configuration: one regular actor, one administrator, and loop
/// intervals tightened so tests never wait on production cadences.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.actor_tokens = vec![
        ActorToken {
            actor_id: "alice".to_string(),
            token: "tok-alice".to_string(),
        },
        ActorToken {
            actor_id: "root".to_string(),
            token: "tok-root".to_string(),
        },
    ];
    config.admin_actors = vec!["root".to_string()];
    config.executor.tick_ms = 100;
    config.scheduler.tick_interval_seconds = 10;
    config.retry.model_base_delay_ms = 1;
    config.retry.model_max_delay_ms = 10;
    config.retry.api_base_delay_ms = 1;
    config.retry.api_max_delay_ms = 10;
    config
}
