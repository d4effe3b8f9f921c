//! Migration to create the enrichment_jobs table.
//!
//! One row per unit of enrichment work (single-record or batch), carrying the
//! status lifecycle and incremental progress counters the executor persists at
//! record boundaries.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EnrichmentJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EnrichmentJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EnrichmentJobs::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(EnrichmentJobs::TargetRecordId).uuid().null())
                    .col(ColumnDef::new(EnrichmentJobs::ActorId).text().not_null())
                    .col(ColumnDef::new(EnrichmentJobs::JobType).text().not_null())
                    .col(
                        ColumnDef::new(EnrichmentJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::Priority)
                            .small_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::TotalCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::ProcessedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::SuccessCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::FailureCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(EnrichmentJobs::LastError).text().null())
                    .col(
                        ColumnDef::new(EnrichmentJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EnrichmentJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Claim-order index: next eligible job by priority DESC, then FIFO.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_enrichment_jobs_project_status_priority \
                 ON enrichment_jobs (project_id, status, priority DESC, created_at)"
                    .to_string(),
            ))
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_enrichment_jobs_status_completed_at")
                    .table(EnrichmentJobs::Table)
                    .col(EnrichmentJobs::Status)
                    .col(EnrichmentJobs::CompletedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_enrichment_jobs_project_status_priority")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_enrichment_jobs_status_completed_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(EnrichmentJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EnrichmentJobs {
    Table,
    Id,
    ProjectId,
    TargetRecordId,
    ActorId,
    JobType,
    Status,
    Priority,
    TotalCount,
    ProcessedCount,
    SuccessCount,
    FailureCount,
    RetryCount,
    LastError,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}
