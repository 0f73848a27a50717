//! Import job ledger queries

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{ImportJob, ImportJobStatus, JobData, JobUpdate, SheetRecord};

/// Every column except `json_data`, which is loaded on demand
const JOB_COLUMNS: &str = "id, file_name, user_id, status, progress, total, processed, success, \
    failed, skipped, default_branch, data_stored, issues, error, message, created_at, updated_at";

/// Create an empty pending job
pub async fn create_job(
    pool: &PgPool,
    file_name: &str,
    user_id: Option<&str>,
) -> sqlx::Result<ImportJob> {
    let sql = format!(
        r#"
        INSERT INTO import_jobs (id, file_name, user_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'pending', NOW(), NOW())
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(Uuid::new_v4())
        .bind(file_name)
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Attach parsed rows to a job and mark its data as stored
pub async fn store_job_data(
    pool: &PgPool,
    job_id: Uuid,
    rows: &[SheetRecord],
    default_branch: Option<&str>,
) -> sqlx::Result<ImportJob> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET json_data = $2,
            total = $3,
            default_branch = $4,
            data_stored = TRUE,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .bind(Json(rows))
        .bind(rows.len() as i32)
        .bind(default_branch)
        .fetch_one(pool)
        .await
}

pub async fn get_job(pool: &PgPool, job_id: Uuid) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!("SELECT {} FROM import_jobs WHERE id = $1", JOB_COLUMNS);
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

/// Load stored rows; `None` if the job is missing or has no rows yet
pub async fn load_job_data(pool: &PgPool, job_id: Uuid) -> sqlx::Result<Option<JobData>> {
    let row: Option<(Option<Json<Vec<SheetRecord>>>, Option<String>, bool)> = sqlx::query_as(
        r#"
        SELECT json_data, default_branch, data_stored
        FROM import_jobs
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some((Some(Json(rows)), default_branch, data_stored)) => Some(JobData {
            rows,
            default_branch,
            data_stored,
        }),
        _ => None,
    })
}

/// Conditionally move a job into `processing`.
///
/// Only one of several concurrent callers gets a row back.
pub async fn claim_job(pool: &PgPool, job_id: Uuid) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET status = 'processing',
            progress = 0,
            processed = 0,
            success = 0,
            failed = 0,
            skipped = 0,
            issues = '[]'::jsonb,
            error = NULL,
            message = NULL,
            updated_at = NOW()
        WHERE id = $1
          AND status IN ('pending', 'failed')
          AND data_stored
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

/// Apply a partial update; unset fields keep their stored value
pub async fn update_job(
    pool: &PgPool,
    job_id: Uuid,
    update: &JobUpdate,
) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET status = COALESCE($2, status),
            total = COALESCE($3, total),
            processed = COALESCE($4, processed),
            success = COALESCE($5, success),
            failed = COALESCE($6, failed),
            skipped = COALESCE($7, skipped),
            progress = COALESCE($8, progress),
            issues = COALESCE($9, issues),
            message = COALESCE($10, message),
            error = COALESCE($11, error),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        JOB_COLUMNS
    );

    let counts = update.counts;
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .bind(update.status)
        .bind(counts.map(|c| c.total as i32))
        .bind(counts.map(|c| c.processed as i32))
        .bind(counts.map(|c| c.success as i32))
        .bind(counts.map(|c| c.failed as i32))
        .bind(counts.map(|c| c.skipped as i32))
        .bind(counts.map(|c| c.progress()))
        .bind(update.issues.as_ref().map(|issues| Json(issues.as_slice())))
        .bind(update.message.as_deref())
        .bind(update.error.as_deref())
        .fetch_optional(pool)
        .await
}

/// Most recent jobs first
/// Newest jobs first; `status` narrows the list before the limit applies
pub async fn list_jobs(
    pool: &PgPool,
    limit: i64,
    status: Option<ImportJobStatus>,
) -> sqlx::Result<Vec<ImportJob>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM import_jobs
        WHERE ($2::import_job_status IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $1
        "#,
        JOB_COLUMNS
    );
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(limit)
        .bind(status)
        .fetch_all(pool)
        .await
}
