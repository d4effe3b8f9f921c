//! Migration to create the blocked_actors and security_alerts tables.
//!
//! Both are owned by the rate limiter subsystem: blocked_actors holds hard
//! blocks applied after repeated limit violations, security_alerts is the
//! audit trail the monitor appends to.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BlockedActors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BlockedActors::ActorId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BlockedActors::Reason).text().not_null())
                    .col(
                        ColumnDef::new(BlockedActors::BlockedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BlockedActors::BlockedUntil)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SecurityAlerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SecurityAlerts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SecurityAlerts::ActorId).text().not_null())
                    .col(ColumnDef::new(SecurityAlerts::Severity).text().not_null())
                    .col(ColumnDef::new(SecurityAlerts::AlertType).text().not_null())
                    .col(ColumnDef::new(SecurityAlerts::Description).text().not_null())
                    .col(
                        ColumnDef::new(SecurityAlerts::Resolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SecurityAlerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_security_alerts_actor_created")
                    .table(SecurityAlerts::Table)
                    .col(SecurityAlerts::ActorId)
                    .col(SecurityAlerts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_security_alerts_actor_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SecurityAlerts::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BlockedActors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BlockedActors {
    Table,
    ActorId,
    Reason,
    BlockedAt,
    BlockedUntil,
}

#[derive(DeriveIden)]
enum SecurityAlerts {
    Table,
    Id,
    ActorId,
    Severity,
    AlertType,
    Description,
    Resolved,
    CreatedAt,
}
