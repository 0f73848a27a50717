//! Batch persister
//!
//! Writes accepted rows in file order and keeps the ledger counters current.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::job_ledger::JobLedger;
use crate::services::normalizer::SkipReason;
use crate::services::store::{Store, StoreError};
use crate::types::{ClientDraft, ImportJobStatus, InsertOutcome, JobCounts, RowIssue};

/// Accepted row waiting to be written
#[derive(Debug, Clone)]
pub struct PendingRow {
    /// 1-based row number in the sheet
    pub row: u32,
    pub draft: ClientDraft,
}

pub struct BatchPersister<'a> {
    store: &'a dyn Store,
    ledger: &'a JobLedger,
    job_id: Uuid,
    progress_every: usize,
}

impl<'a> BatchPersister<'a> {
    pub fn new(store: &'a dyn Store, ledger: &'a JobLedger, job_id: Uuid, progress_every: usize) -> Self {
        Self {
            store,
            ledger,
            job_id,
            progress_every: progress_every.max(1),
        }
    }

    /// Write every row. A refused single write counts as failed and the batch
    /// continues; an unreachable store aborts with the error.
    pub async fn persist(
        &self,
        rows: Vec<PendingRow>,
        counts: &mut JobCounts,
        issues: &mut Vec<RowIssue>,
    ) -> Result<(), StoreError> {
        for (idx, pending) in rows.into_iter().enumerate() {
            match self.store.insert_client(&pending.draft).await {
                Ok(InsertOutcome::Inserted(client)) => {
                    debug!("Row {}: imported client {}", pending.row, client.id);
                    counts.record_success();
                }
                Ok(InsertOutcome::Duplicate) => {
                    // A concurrent import wrote the same phone+branch first
                    let reason = SkipReason::AlreadyExists {
                        phone: pending.draft.phone_number.trim().to_string(),
                    };
                    counts.record_skip();
                    issues.push(RowIssue {
                        row: pending.row,
                        name: pending.draft.name.clone(),
                        code: reason.code().to_string(),
                        reason: reason.to_string(),
                    });
                }
                Err(e) if e.is_catastrophic() => return Err(e),
                Err(e) => {
                    warn!("Row {}: failed to save client: {}", pending.row, e);
                    counts.record_failure();
                    issues.push(RowIssue {
                        row: pending.row,
                        name: pending.draft.name.clone(),
                        code: "write_failed".to_string(),
                        reason: format!("Failed to save client: {}", e),
                    });
                }
            }

            if (idx + 1) % self.progress_every == 0 {
                self.checkpoint(*counts).await?;
            }
        }

        Ok(())
    }

    async fn checkpoint(&self, counts: JobCounts) -> Result<(), StoreError> {
        self.ledger
            .checkpoint(self.job_id, ImportJobStatus::Importing, counts)
            .await
    }
}
