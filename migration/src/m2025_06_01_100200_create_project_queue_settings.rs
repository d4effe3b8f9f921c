//! Migration to create the project_queue_settings table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProjectQueueSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectQueueSettings::ProjectId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProjectQueueSettings::ExecutionMode)
                            .text()
                            .not_null()
                            .default("sequential"),
                    )
                    .col(
                        ColumnDef::new(ProjectQueueSettings::MaxParallelJobs)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(ProjectQueueSettings::Paused)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProjectQueueSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectQueueSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProjectQueueSettings {
    Table,
    ProjectId,
    ExecutionMode,
    MaxParallelJobs,
    Paused,
    UpdatedAt,
}
