//! PostgreSQL-backed store

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::services::store::{ClientStore, JobStore, StoreError, StoreResult};
use crate::types::{
    Branch, Client, ClientDraft, ClientQuery, ImportJob, ImportJobStatus, InsertOutcome, JobData,
    JobUpdate, SheetRecord, UpdateOutcome,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientStore for PgStore {
    async fn list_branches(&self) -> StoreResult<Vec<Branch>> {
        Ok(queries::branch::list_branches(&self.pool).await?)
    }

    async fn create_branch(&self, name: &str) -> StoreResult<Option<Branch>> {
        Ok(queries::branch::create_branch(&self.pool, name).await?)
    }

    async fn find_client_by_phone(
        &self,
        phone: &str,
        branch: Option<&str>,
        exclude: Option<Uuid>,
    ) -> StoreResult<Option<Uuid>> {
        Ok(queries::client::find_client_by_phone(&self.pool, phone, branch, exclude).await?)
    }

    async fn insert_client(&self, draft: &ClientDraft) -> StoreResult<InsertOutcome> {
        Ok(match queries::client::insert_client(&self.pool, draft).await? {
            Some(client) => InsertOutcome::Inserted(client),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(queries::client::get_client(&self.pool, id).await?)
    }

    async fn update_client(&self, id: Uuid, draft: &ClientDraft) -> StoreResult<UpdateOutcome> {
        Ok(queries::client::update_client(&self.pool, id, draft).await?)
    }

    async fn delete_client(&self, id: Uuid) -> StoreResult<bool> {
        Ok(queries::client::delete_client(&self.pool, id).await?)
    }

    async fn list_clients(&self, query: &ClientQuery) -> StoreResult<Vec<Client>> {
        Ok(queries::client::list_clients(&self.pool, query).await?)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, file_name: &str, user_id: Option<&str>) -> StoreResult<ImportJob> {
        Ok(queries::import_job::create_job(&self.pool, file_name, user_id).await?)
    }

    async fn store_job_data(
        &self,
        job_id: Uuid,
        rows: &[SheetRecord],
        default_branch: Option<&str>,
    ) -> StoreResult<ImportJob> {
        Ok(queries::import_job::store_job_data(&self.pool, job_id, rows, default_branch).await?)
    }

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>> {
        Ok(queries::import_job::get_job(&self.pool, job_id).await?)
    }

    async fn load_job_data(&self, job_id: Uuid) -> StoreResult<Option<JobData>> {
        Ok(queries::import_job::load_job_data(&self.pool, job_id).await?)
    }

    async fn claim_job(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>> {
        Ok(queries::import_job::claim_job(&self.pool, job_id).await?)
    }

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> StoreResult<ImportJob> {
        queries::import_job::update_job(&self.pool, job_id, update)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn list_jobs(
        &self,
        limit: i64,
        status: Option<ImportJobStatus>,
    ) -> StoreResult<Vec<ImportJob>> {
        Ok(queries::import_job::list_jobs(&self.pool, limit, status).await?)
    }
}
