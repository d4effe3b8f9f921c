//! Migration to create the schedules table.
//!
//! A schedule is a persisted trigger that materializes batch jobs at due
//! time, optionally recurring daily or weekly.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Schedules::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Schedules::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Schedules::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Schedules::ActorId).text().not_null())
                    .col(
                        ColumnDef::new(Schedules::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Schedules::Recurrence)
                            .text()
                            .not_null()
                            .default("once"),
                    )
                    .col(
                        ColumnDef::new(Schedules::BatchSize)
                            .integer()
                            .not_null()
                            .default(50),
                    )
                    .col(ColumnDef::new(Schedules::MaxRecords).integer().null())
                    .col(
                        ColumnDef::new(Schedules::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Schedules::LastRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Schedules::LastError).text().null())
                    .col(
                        ColumnDef::new(Schedules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Schedules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Sweep index: due schedules are selected by status + fire time.
        manager
            .create_index(
                Index::create()
                    .name("idx_schedules_status_scheduled_at")
                    .table(Schedules::Table)
                    .col(Schedules::Status)
                    .col(Schedules::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_schedules_status_scheduled_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Schedules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Schedules {
    Table,
    Id,
    ProjectId,
    ActorId,
    ScheduledAt,
    Recurrence,
    BatchSize,
    MaxRecords,
    Status,
    LastRunAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
