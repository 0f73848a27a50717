//! Job ledger
//!
//! Single source of truth for import progress. Every write goes to the
//! store first and is then pushed to observers on
//! `spa.job.import.status.<jobId>`. A failed push is logged and never fails
//! the write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_nats::Client;
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::store::{Store, StoreResult};
use crate::types::{
    ImportJob, ImportJobStatus, ImportJobStatusUpdate, JobCounts, JobData, JobUpdate, RowIssue,
    SheetRecord,
};

pub const STATUS_PREFIX: &str = "spa.job.import.status";

/// Pushes ledger snapshots to observers
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, update: &ImportJobStatusUpdate) -> Result<()>;
}

/// Publishes snapshots as plain NATS messages
pub struct NatsStatusPublisher {
    client: Client,
}

impl NatsStatusPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusPublisher for NatsStatusPublisher {
    async fn publish(&self, update: &ImportJobStatusUpdate) -> Result<()> {
        let subject = format!("{}.{}", STATUS_PREFIX, update.job_id);
        let payload = serde_json::to_vec(update)?;
        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }
}

/// Bounded re-check with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Call `check` until it yields a value or attempts run out.
    /// Errors end the loop immediately.
    pub async fn until_some<T, E, F, Fut>(&self, mut check: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(value) = check().await? {
                return Ok(Some(value));
            }
            if attempt < attempts {
                debug!("Attempt {}/{} found nothing, retrying in {:?}", attempt, attempts, self.delay);
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(None)
    }
}

pub struct JobLedger {
    store: Arc<dyn Store>,
    publisher: Arc<dyn StatusPublisher>,
}

impl JobLedger {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn StatusPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn create(&self, file_name: &str, user_id: Option<&str>) -> StoreResult<ImportJob> {
        let job = self.store.create_job(file_name, user_id).await?;
        self.publish(&job).await;
        Ok(job)
    }

    pub async fn attach_data(
        &self,
        job_id: Uuid,
        rows: &[SheetRecord],
        default_branch: Option<&str>,
    ) -> StoreResult<ImportJob> {
        let job = self.store.store_job_data(job_id, rows, default_branch).await?;
        self.publish(&job).await;
        Ok(job)
    }

    pub async fn get(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>> {
        self.store.get_job(job_id).await
    }

    /// Stored rows, or `None` while the second upload write has not landed
    pub async fn load_data(&self, job_id: Uuid) -> StoreResult<Option<JobData>> {
        Ok(self
            .store
            .load_job_data(job_id)
            .await?
            .filter(|data| data.data_stored))
    }

    pub async fn list(
        &self,
        limit: i64,
        status: Option<ImportJobStatus>,
    ) -> StoreResult<Vec<ImportJob>> {
        self.store.list_jobs(limit, status).await
    }

    /// Take ownership of a run; `None` if another trigger got there first
    pub async fn claim(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>> {
        let claimed = self.store.claim_job(job_id).await?;
        if let Some(ref job) = claimed {
            self.publish(job).await;
        }
        Ok(claimed)
    }

    pub async fn record_progress(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        counts: JobCounts,
    ) -> StoreResult<ImportJob> {
        self.write(
            job_id,
            JobUpdate {
                status: Some(status),
                counts: Some(counts),
                ..Default::default()
            },
        )
        .await
    }

    /// Progress write that only a store outage can fail; a refused write
    /// is logged and the run goes on
    pub async fn checkpoint(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        counts: JobCounts,
    ) -> StoreResult<()> {
        match self.record_progress(job_id, status, counts).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_catastrophic() => Err(e),
            Err(e) => {
                warn!("Job {}: progress update skipped: {}", job_id, e);
                Ok(())
            }
        }
    }

    pub async fn complete(
        &self,
        job_id: Uuid,
        counts: JobCounts,
        issues: Vec<RowIssue>,
    ) -> StoreResult<ImportJob> {
        self.write(
            job_id,
            JobUpdate {
                status: Some(ImportJobStatus::Completed),
                counts: Some(counts),
                issues: Some(issues),
                message: Some(summary_message(&counts)),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn fail(
        &self,
        job_id: Uuid,
        counts: Option<JobCounts>,
        issues: Option<Vec<RowIssue>>,
        error: &str,
    ) -> StoreResult<ImportJob> {
        self.write(
            job_id,
            JobUpdate {
                status: Some(ImportJobStatus::Failed),
                counts,
                issues,
                message: Some(format!("Import failed: {}", error)),
                error: Some(error.to_string()),
            },
        )
        .await
    }

    async fn write(&self, job_id: Uuid, update: JobUpdate) -> StoreResult<ImportJob> {
        let job = self.store.update_job(job_id, &update).await?;
        self.publish(&job).await;
        Ok(job)
    }

    async fn publish(&self, job: &ImportJob) {
        let update = ImportJobStatusUpdate::new(job.clone());
        if let Err(e) = self.publisher.publish(&update).await {
            warn!("Failed to publish status for job {}: {}", job.id, e);
        }
    }
}

/// `Successfully imported N client(s). F failed. S row(s) skipped.`, zero clauses omitted
pub fn summary_message(counts: &JobCounts) -> String {
    let mut message = format!("Successfully imported {} client(s).", counts.success);
    if counts.failed > 0 {
        message.push_str(&format!(" {} failed.", counts.failed));
    }
    if counts.skipped > 0 {
        message.push_str(&format!(" {} row(s) skipped.", counts.skipped));
    }
    message
}
