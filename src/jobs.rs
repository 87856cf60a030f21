use crate::catalog::CatalogSource;
use crate::entities;
use crate::errors::IndexError;
use crate::index::{CancelToken, IndexOptions, IndexResult, Indexer, Scope};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, NotSet,
    QueryFilter, QueryOrder, Set,
};
use tracing::{error, info};

pub const TARGET_INDEX_JOB: &str = "target_index";

/// Record the start of a job execution
pub async fn start_job_execution(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<i64, IndexError> {
    use entities::job_execution;

    let now = Utc::now().timestamp();

    let execution = job_execution::ActiveModel {
        id: NotSet,
        job_name: Set(job_name.to_string()),
        started_at: Set(now),
        completed_at: Set(None),
        success: Set(None),
        error_message: Set(None),
        records_processed: Set(None),
        statistics: Set(None),
    };

    let result = execution.insert(db).await?;
    Ok(result.id)
}

/// Record the completion of a job execution
pub async fn complete_job_execution(
    db: &DatabaseConnection,
    execution_id: i64,
    success: bool,
    error_message: Option<String>,
    records_processed: Option<i64>,
    statistics: Option<String>,
) -> Result<(), IndexError> {
    use entities::job_execution::{Column, Entity};

    let now = Utc::now().timestamp();

    if let Some(execution) = Entity::find()
        .filter(Column::Id.eq(execution_id))
        .one(db)
        .await?
    {
        let mut active: entities::job_execution::ActiveModel = execution.into_active_model();
        active.completed_at = Set(Some(now));
        active.success = Set(Some(if success { 1 } else { 0 }));
        active.error_message = Set(error_message);
        active.records_processed = Set(records_processed);
        active.statistics = Set(statistics);
        active.update(db).await?;
    }

    Ok(())
}

/// Most recent executions of a job, newest first.
pub async fn recent_job_executions(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<Vec<entities::job_execution::Model>, IndexError> {
    use entities::job_execution::{Column, Entity};

    let executions = Entity::find()
        .filter(Column::JobName.eq(job_name))
        .order_by_desc(Column::Id)
        .all(db)
        .await?;
    Ok(executions)
}

/// Run the indexer and record the run as a job execution, statistics included.
pub async fn run_indexing_job<K>(
    db: &DatabaseConnection,
    catalog: &K,
    options: IndexOptions,
    scope: Scope,
    cancel: CancelToken,
) -> Result<IndexResult, IndexError>
where
    K: CatalogSource + ?Sized,
{
    info!("Running {} job", TARGET_INDEX_JOB);
    let execution_id = start_job_execution(db, TARGET_INDEX_JOB).await?;

    let result = Indexer::new(catalog, db, options)
        .with_scope(scope)
        .with_cancel(cancel)
        .run()
        .await;

    let statistics = serde_json::to_string(&result.stats)?;
    let records = result.stats.objects_indexed() as i64;
    match &result.error {
        None => {
            info!(
                "{} job completed: {} objects indexed",
                TARGET_INDEX_JOB, records
            );
            complete_job_execution(db, execution_id, true, None, Some(records), Some(statistics))
                .await?;
        }
        Some(e) => {
            error!("{} job failed: {}", TARGET_INDEX_JOB, e);
            complete_job_execution(
                db,
                execution_id,
                false,
                Some(e.to_string()),
                Some(records),
                Some(statistics),
            )
            .await?;
        }
    }

    Ok(result)
}
