use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Auto-increment ids are 64 bit on Postgres, SQLite aliases INTEGER to rowid
        let assoc_id = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(TargetAssociations::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(TargetAssociations::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(TargetAssociations::Table)
                    .if_not_exists()
                    .col(assoc_id)
                    .col(string(TargetAssociations::OwnerKind))
                    .col(string(TargetAssociations::OwnerId))
                    .col(string_null(TargetAssociations::Application))
                    .col(string(TargetAssociations::TargetKind))
                    .col(string(TargetAssociations::TargetType))
                    .col(string(TargetAssociations::TargetName))
                    .col(string_null(TargetAssociations::Rights))
                    .col(string_null(TargetAssociations::Hierarchy))
                    .col(
                        ColumnDef::new(TargetAssociations::Flattened)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(string_null(TargetAssociations::Classifications))
                    .to_owned(),
            )
            .await?;

        // Owner lookups: loading the current set of one object
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_target_assoc_owner")
                    .table(TargetAssociations::Table)
                    .col(TargetAssociations::OwnerKind)
                    .col(TargetAssociations::OwnerId)
                    .to_owned(),
            )
            .await?;

        // Reverse lookups: which owners grant a target
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_target_assoc_target")
                    .table(TargetAssociations::Table)
                    .col(TargetAssociations::TargetName)
                    .to_owned(),
            )
            .await?;

        let class_id = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(EffectiveClassifications::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(EffectiveClassifications::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(EffectiveClassifications::Table)
                    .if_not_exists()
                    .col(class_id)
                    .col(string(EffectiveClassifications::OwnerKind))
                    .col(string(EffectiveClassifications::OwnerId))
                    .col(string(EffectiveClassifications::Classification))
                    .col(string(EffectiveClassifications::Source))
                    .col(big_integer(EffectiveClassifications::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_effective_class_unique")
                    .table(EffectiveClassifications::Table)
                    .col(EffectiveClassifications::OwnerKind)
                    .col(EffectiveClassifications::OwnerId)
                    .col(EffectiveClassifications::Classification)
                    .unique()
                    .to_owned(),
            )
            .await?;

        let job_id = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(JobExecutions::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(JobExecutions::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(job_id)
                    .col(string(JobExecutions::JobName))
                    .col(big_integer(JobExecutions::StartedAt))
                    .col(big_integer_null(JobExecutions::CompletedAt))
                    .col(big_integer_null(JobExecutions::Success))
                    .col(string_null(JobExecutions::ErrorMessage))
                    .col(big_integer_null(JobExecutions::RecordsProcessed))
                    .col(string_null(JobExecutions::Statistics))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_executions_started")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EffectiveClassifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TargetAssociations::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum TargetAssociations {
    Table,
    Id,
    OwnerKind,
    OwnerId,
    Application,
    TargetKind,
    TargetType,
    TargetName,
    Rights,
    Hierarchy,
    Flattened,
    Classifications,
}

#[derive(DeriveIden)]
enum EffectiveClassifications {
    Table,
    Id,
    OwnerKind,
    OwnerId,
    Classification,
    Source,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobName,
    StartedAt,
    CompletedAt,
    Success,
    ErrorMessage,
    RecordsProcessed,
    Statistics,
}
