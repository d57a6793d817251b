use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_jobs_table(manager).await?;
        self.create_job_history_table(manager).await?;
        self.create_indexes(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    // ULIDs are 26 characters; a bounded length keeps MySQL happy with indexes
    fn create_id_column(&self, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        col.string_len(26).not_null();
        col
    }

    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = self.timestamp_column(manager, column);
        col.not_null();
        col
    }

    fn create_nullable_timestamp_column(
        &self,
        manager: &SchemaManager,
        column: impl IntoIden,
    ) -> ColumnDef {
        let mut col = self.timestamp_column(manager, column);
        col.null();
        col
    }

    fn timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            // Plain TIMESTAMP on MySQL truncates to whole seconds
            sea_orm::DatabaseBackend::MySql => col.custom(Alias::new("DATETIME(6)")),
            _ => col.timestamp_with_time_zone(),
        };
        col
    }

    async fn create_jobs_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(self.create_id_column(Jobs::Id).primary_key())
                    .col(ColumnDef::new(Jobs::JobType).string_len(64).not_null())
                    .col(ColumnDef::new(Jobs::TargetId).string_len(255).not_null())
                    .col(ColumnDef::new(Jobs::TargetName).string())
                    .col(ColumnDef::new(Jobs::Status).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Jobs::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Jobs::Payload).text())
                    .col(self.create_nullable_timestamp_column(manager, Jobs::NextRunAt))
                    .col(ColumnDef::new(Jobs::LockedBy).string_len(255))
                    .col(self.create_nullable_timestamp_column(manager, Jobs::LockedAt))
                    .col(self.create_nullable_timestamp_column(manager, Jobs::StartedAt))
                    .col(self.create_nullable_timestamp_column(manager, Jobs::CompletedAt))
                    .col(
                        ColumnDef::new(Jobs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Jobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(Jobs::Result).text())
                    .col(ColumnDef::new(Jobs::ErrorMessage).text())
                    .col(self.create_timestamp_column(manager, Jobs::CreatedAt))
                    .col(self.create_timestamp_column(manager, Jobs::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_job_history_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobHistory::Table)
                    .if_not_exists()
                    .col(self.create_id_column(JobHistory::Id).primary_key())
                    .col(self.create_id_column(JobHistory::JobId))
                    .col(ColumnDef::new(JobHistory::JobType).string_len(64).not_null())
                    .col(ColumnDef::new(JobHistory::TargetId).string_len(255).not_null())
                    .col(ColumnDef::new(JobHistory::TargetName).string())
                    .col(ColumnDef::new(JobHistory::Status).string_len(32).not_null())
                    .col(ColumnDef::new(JobHistory::WorkerId).string_len(255))
                    .col(
                        ColumnDef::new(JobHistory::AttemptNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(self.create_nullable_timestamp_column(manager, JobHistory::StartedAt))
                    .col(self.create_timestamp_column(manager, JobHistory::CompletedAt))
                    .col(ColumnDef::new(JobHistory::DurationMs).big_integer())
                    .col(ColumnDef::new(JobHistory::Result).text())
                    .col(ColumnDef::new(JobHistory::ErrorMessage).text())
                    .to_owned(),
            )
            .await
    }

    async fn create_indexes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        // Claim predicate: status + readiness, ordered by priority
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_claim")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .col(Jobs::Priority)
                    .col(Jobs::NextRunAt)
                    .to_owned(),
            )
            .await?;

        // Dedup lookup and GetByTargetID
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_type_target")
                    .table(Jobs::Table)
                    .col(Jobs::JobType)
                    .col(Jobs::TargetId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_target_id")
                    .table(Jobs::Table)
                    .col(Jobs::TargetId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_locked_by")
                    .table(Jobs::Table)
                    .col(Jobs::LockedBy)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_jobs_completed_at")
                    .table(Jobs::Table)
                    .col(Jobs::CompletedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_history_job_id")
                    .table(JobHistory::Table)
                    .col(JobHistory::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_history_type_completed")
                    .table(JobHistory::Table)
                    .col(JobHistory::JobType)
                    .col(JobHistory::CompletedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_history_completed_at")
                    .table(JobHistory::Table)
                    .col(JobHistory::CompletedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    JobType,
    TargetId,
    TargetName,
    Status,
    Priority,
    Payload,
    NextRunAt,
    LockedBy,
    LockedAt,
    StartedAt,
    CompletedAt,
    AttemptCount,
    MaxAttempts,
    Result,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum JobHistory {
    Table,
    Id,
    JobId,
    JobType,
    TargetId,
    TargetName,
    Status,
    WorkerId,
    AttemptNumber,
    StartedAt,
    CompletedAt,
    DurationMs,
    Result,
    ErrorMessage,
}
