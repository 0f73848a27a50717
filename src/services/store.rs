//! Storage abstraction for clients, branches and import jobs
//!
//! Two backends implement the traits:
//! - `PgStore` (PostgreSQL, production)
//! - `MemoryStore` (in-process, development and tests)
//!
//! Configuration via STORE_BACKEND env variable:
//! - "postgres" → PgStore (default)
//! - "memory" → MemoryStore, seeded from SEED_BRANCHES

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, store::PgStore};
use crate::services::memory_store::MemoryStore;
use crate::types::{
    Branch, Client, ClientDraft, ClientQuery, ImportJob, ImportJobStatus, InsertOutcome, JobData,
    JobUpdate, SheetRecord, UpdateOutcome,
};

/// Storage failure, classified by what the caller can do about it
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable; the current operation cannot continue
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A single write or read was refused; other operations may succeed
    #[error("store rejected operation: {0}")]
    Rejected(String),

    #[error("record not found")]
    NotFound,
}

impl StoreError {
    pub fn is_catastrophic(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Rejected(other.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Clients and branches
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn list_branches(&self) -> StoreResult<Vec<Branch>>;

    /// Returns `None` when a branch with that name already exists
    async fn create_branch(&self, name: &str) -> StoreResult<Option<Branch>>;

    /// Phone is matched as a trimmed string; `branch = None` searches all
    /// branches. A client whose id is `exclude` never matches.
    async fn find_client_by_phone(
        &self,
        phone: &str,
        branch: Option<&str>,
        exclude: Option<Uuid>,
    ) -> StoreResult<Option<Uuid>>;

    /// Insert under the (branch, phone) uniqueness rule
    async fn insert_client(&self, draft: &ClientDraft) -> StoreResult<InsertOutcome>;

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>>;

    /// Overwrite every field of a client under the same uniqueness rule
    async fn update_client(&self, id: Uuid, draft: &ClientDraft) -> StoreResult<UpdateOutcome>;

    /// `false` when no client had that id
    async fn delete_client(&self, id: Uuid) -> StoreResult<bool>;

    /// Newest first
    async fn list_clients(&self, query: &ClientQuery) -> StoreResult<Vec<Client>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Import job ledger persistence
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, file_name: &str, user_id: Option<&str>) -> StoreResult<ImportJob>;

    /// Store raw rows, set `total` and mark the data as stored
    async fn store_job_data(
        &self,
        job_id: Uuid,
        rows: &[SheetRecord],
        default_branch: Option<&str>,
    ) -> StoreResult<ImportJob>;

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>>;

    async fn load_job_data(&self, job_id: Uuid) -> StoreResult<Option<JobData>>;

    /// Move a pending or failed job with stored data to `processing`,
    /// resetting counters. `None` when the job is not claimable.
    async fn claim_job(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>>;

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> StoreResult<ImportJob>;

    /// Newest first, optionally only jobs in one state
    async fn list_jobs(
        &self,
        limit: i64,
        status: Option<ImportJobStatus>,
    ) -> StoreResult<Vec<ImportJob>>;
}

/// Everything the worker needs from storage
pub trait Store: ClientStore + JobStore {}

impl<T: ClientStore + JobStore> Store for T {}

/// Create the store selected by `config.store_backend`
pub async fn create_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.store_backend.as_str() {
        "memory" => {
            tracing::info!("Using MemoryStore");
            let store = MemoryStore::with_branches(&config.seed_branches);
            Ok(Arc::new(store))
        }
        "postgres" => {
            tracing::info!("Using PgStore");
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store backend")?;
            let pool = db::create_pool(url).await?;
            tracing::info!("Connected to PostgreSQL");
            db::run_migrations(&pool).await?;
            let store = PgStore::new(pool);
            for name in &config.seed_branches {
                store.create_branch(name).await?;
            }
            Ok(Arc::new(store))
        }
        other => {
            anyhow::bail!("Unknown STORE_BACKEND '{}' (expected 'postgres' or 'memory')", other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::NotFound));
        assert!(!err.is_catastrophic());
    }

    #[test]
    fn test_pool_errors_are_catastrophic() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_catastrophic());
        let err: StoreError = sqlx::Error::PoolClosed.into();
        assert!(err.is_catastrophic());
    }

    #[test]
    fn test_other_errors_are_rejections() {
        let err: StoreError = sqlx::Error::ColumnNotFound("phone".into()).into();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(!err.is_catastrophic());
    }
}
