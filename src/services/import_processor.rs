//! Client import processor
//!
//! Drives a spreadsheet import from upload to a terminal ledger state:
//! - `upload` parses the file, creates the job and stores its rows
//! - `process` claims the job and runs it; safe to call any number of times
//!
//! A run has two phases. First every row is normalized and filtered
//! (status `processing`), then accepted rows are written (status `importing`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ImportError;
use crate::services::job_ledger::{JobLedger, RetryPolicy, StatusPublisher};
use crate::services::normalizer::{ColumnRules, RowNormalizer, SkipReason};
use crate::services::payload;
use crate::services::persister::{BatchPersister, PendingRow};
use crate::services::row_filter::{FilterDecision, RowFilter};
use crate::services::spreadsheet::{is_spreadsheet_file, parse_workbook_blocking};
use crate::services::store::{Store, StoreError};
use crate::types::{
    ImportHistoryResponse, ImportJob, ImportJobStatus, JobCounts, JobData, ProcessJobResponse,
    RowIssue, UploadRequest, UploadResponse,
};

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

/// Import tuning, read from `Config`
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Start processing right after upload
    pub background_processing: bool,
    pub trigger_delay: Duration,
    pub max_upload_bytes: usize,
    /// Ledger checkpoint cadence in rows
    pub progress_every: usize,
    /// Waiting for rows of a freshly uploaded job
    pub data_retry: RetryPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            background_processing: true,
            trigger_delay: Duration::from_millis(100),
            max_upload_bytes: 10 * 1024 * 1024,
            progress_every: 10,
            data_retry: RetryPolicy::default(),
        }
    }
}

impl ImportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            background_processing: config.background_processing,
            max_upload_bytes: config.max_upload_bytes,
            progress_every: config.import_progress_every,
            data_retry: RetryPolicy {
                max_attempts: config.import_retry_attempts,
                delay: Duration::from_millis(config.import_retry_delay_ms),
            },
            ..Default::default()
        }
    }
}

/// Counters and issues of the run in flight
struct RunState {
    counts: JobCounts,
    issues: Vec<RowIssue>,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            counts: JobCounts::new(total as u32),
            issues: Vec::new(),
        }
    }

    fn skip(&mut self, row: u32, name: String, reason: &SkipReason) {
        self.counts.record_skip();
        self.issues.push(RowIssue {
            row,
            name,
            code: reason.code().to_string(),
            reason: reason.to_string(),
        });
    }
}

pub struct ImportProcessor {
    store: Arc<dyn Store>,
    ledger: JobLedger,
    rules: ColumnRules,
    settings: ImportSettings,
}

impl ImportProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn StatusPublisher>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            ledger: JobLedger::new(Arc::clone(&store), publisher),
            store,
            rules: ColumnRules::default(),
            settings,
        }
    }

    /// Replace the header matching rules
    pub fn with_rules(mut self, rules: ColumnRules) -> Self {
        self.rules = rules;
        self
    }

    /// Parse an uploaded workbook and record it as a pending job
    pub async fn upload(
        self: &Arc<Self>,
        user_id: Option<&str>,
        request: UploadRequest,
    ) -> Result<UploadResponse, ImportError> {
        let file_name = request.file_name.trim();
        if file_name.is_empty() {
            return Err(ImportError::MissingField("fileName"));
        }
        if !is_spreadsheet_file(file_name) {
            return Err(ImportError::InvalidFileType);
        }

        let bytes = payload::decode_file(&request.file_base64, self.settings.max_upload_bytes)?;
        debug!("Upload {}: {} bytes", file_name, bytes.len());
        let rows = parse_workbook_blocking(bytes).await?;

        let default_branch = request
            .default_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());

        let job = self.ledger.create(file_name, user_id).await?;
        if let Err(e) = self.ledger.attach_data(job.id, &rows, default_branch).await {
            error!("Failed to store rows for job {}: {}", job.id, e);
            let reason = format!("Failed to store uploaded rows: {}", e);
            if let Err(fail_err) = self.ledger.fail(job.id, None, None, &reason).await {
                warn!("Could not mark job {} as failed: {}", job.id, fail_err);
            }
            return Err(e.into());
        }

        info!("Import job {} created from '{}' ({} rows)", job.id, file_name, rows.len());

        if self.settings.background_processing {
            let processor = Arc::clone(self);
            let job_id = job.id;
            tokio::spawn(async move {
                tokio::time::sleep(processor.settings.trigger_delay).await;
                match processor.process(job_id).await {
                    Ok(response) => debug!("Background run of job {}: {}", job_id, response.message),
                    Err(e) => warn!("Background run of job {} failed: {}", job_id, e),
                }
            });
        }

        Ok(UploadResponse {
            success: true,
            job_id: job.id,
            total_rows: rows.len(),
            message: format!(
                "File uploaded successfully. {} row(s) queued for import.",
                rows.len()
            ),
        })
    }

    /// Start or report on a job. Never runs the same job twice at once.
    pub async fn process(&self, job_id: Uuid) -> Result<ProcessJobResponse, ImportError> {
        let job = self
            .ledger
            .get(job_id)
            .await?
            .ok_or(ImportError::JobNotFound(job_id))?;

        if let Some(response) = already_handled(job.status) {
            debug!("Job {} trigger ignored: {}", job_id, job.status);
            return Ok(response);
        }

        let data = self
            .settings
            .data_retry
            .until_some(|| self.ledger.load_data(job_id))
            .await?
            .ok_or(ImportError::NoData)?;

        let job = match self.ledger.claim(job_id).await? {
            Some(job) => job,
            None => {
                // Another trigger won the claim
                let status = self
                    .ledger
                    .get(job_id)
                    .await?
                    .map(|j| j.status)
                    .unwrap_or(job.status);
                return Ok(already_handled(status).unwrap_or_else(|| ProcessJobResponse {
                    success: true,
                    message: "Job is already being processed".to_string(),
                    status,
                }));
            }
        };

        let start = Instant::now();
        info!("Processing import job {} ({} rows)", job_id, data.rows.len());
        let mut state = RunState::new(data.rows.len());

        match self.run(&job, data, &mut state).await {
            Ok(done) => {
                info!(
                    "Import job {} completed in {}ms: {} imported, {} failed, {} skipped",
                    job_id,
                    start.elapsed().as_millis(),
                    done.success,
                    done.failed,
                    done.skipped
                );
                Ok(ProcessJobResponse {
                    success: true,
                    message: "Job processing completed".to_string(),
                    status: done.status,
                })
            }
            Err(e) => {
                error!("Import job {} failed: {}", job_id, e);
                if let Err(fail_err) = self
                    .ledger
                    .fail(job_id, Some(state.counts), Some(state.issues), &e.to_string())
                    .await
                {
                    error!("Could not mark job {} as failed: {}", job_id, fail_err);
                }
                Err(ImportError::Processing(e.to_string()))
            }
        }
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<ImportJob, ImportError> {
        self.ledger
            .get(job_id)
            .await?
            .ok_or(ImportError::JobNotFound(job_id))
    }

    /// Most recent jobs first, optionally only those in one state
    pub async fn history(
        &self,
        limit: Option<i64>,
        status: Option<ImportJobStatus>,
    ) -> Result<ImportHistoryResponse, ImportError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let jobs = self.ledger.list(limit, status).await?;
        Ok(ImportHistoryResponse {
            total: jobs.len(),
            jobs,
        })
    }

    async fn run(
        &self,
        job: &ImportJob,
        data: JobData,
        state: &mut RunState,
    ) -> Result<ImportJob, StoreError> {
        let default_branch = data.default_branch.or_else(|| job.default_branch.clone());
        let every = self.settings.progress_every.max(1);
        let normalizer = RowNormalizer::new(self.rules.clone());
        let mut filter = RowFilter::load(Arc::clone(&self.store)).await?;
        let mut accepted = Vec::new();

        for (idx, record) in data.rows.iter().enumerate() {
            let row_number = record.row;
            let decision = match normalizer.normalize(&record.cells, default_branch.as_deref()) {
                Ok(draft) => filter.check(draft).await?,
                Err(reason) => FilterDecision::Skip(reason),
            };

            match decision {
                FilterDecision::Accept(draft) => accepted.push(PendingRow {
                    row: row_number,
                    draft,
                }),
                FilterDecision::Skip(reason) => {
                    debug!("Job {} row {} skipped: {}", job.id, row_number, reason);
                    state.skip(row_number, normalizer.row_label(&record.cells), &reason);
                }
            }

            if (idx + 1) % every == 0 {
                self.ledger
                    .checkpoint(job.id, ImportJobStatus::Processing, state.counts)
                    .await?;
            }
        }

        debug!("Job {}: {} row(s) accepted for import", job.id, accepted.len());
        self.ledger
            .checkpoint(job.id, ImportJobStatus::Importing, state.counts)
            .await?;

        BatchPersister::new(self.store.as_ref(), &self.ledger, job.id, every)
            .persist(accepted, &mut state.counts, &mut state.issues)
            .await?;

        state.issues.sort_by_key(|issue| issue.row);
        self.ledger
            .complete(job.id, state.counts, state.issues.clone())
            .await
    }
}

/// Reply for a trigger that must not start a run
fn already_handled(status: ImportJobStatus) -> Option<ProcessJobResponse> {
    let message = if status == ImportJobStatus::Completed {
        "Job is already completed"
    } else if status.is_running() {
        "Job is already being processed"
    } else {
        return None;
    };
    Some(ProcessJobResponse {
        success: true,
        message: message.to_string(),
        status,
    })
}
