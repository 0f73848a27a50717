//! Import job types
//!
//! An `ImportJob` is the ledger entry for one spreadsheet import. Observers
//! receive `ImportJobStatusUpdate` snapshots; the raw rows (`JobData`) are
//! stored next to the job but never broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::SheetRecord;

/// Import job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "import_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImportJobStatus {
    Pending,
    Processing,
    Importing,
    Completed,
    Failed,
}

impl ImportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobStatus::Pending => "pending",
            ImportJobStatus::Processing => "processing",
            ImportJobStatus::Importing => "importing",
            ImportJobStatus::Completed => "completed",
            ImportJobStatus::Failed => "failed",
        }
    }

    /// A run owns the job right now
    pub fn is_running(&self) -> bool {
        matches!(self, ImportJobStatus::Processing | ImportJobStatus::Importing)
    }

    /// States a trigger may start a run from
    pub fn is_claimable(&self) -> bool {
        matches!(self, ImportJobStatus::Pending | ImportJobStatus::Failed)
    }
}

impl std::fmt::Display for ImportJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A skipped or failed row, reported in the job summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    /// Spreadsheet row number (header is row 1)
    pub row: u32,
    pub name: String,
    pub code: String,
    pub reason: String,
}

/// Ledger entry for one import attempt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub file_name: String,
    pub user_id: Option<String>,
    pub status: ImportJobStatus,
    pub progress: i32,
    pub total: i32,
    pub processed: i32,
    pub success: i32,
    pub failed: i32,
    pub skipped: i32,
    pub default_branch: Option<String>,
    pub data_stored: bool,
    #[sqlx(json)]
    pub issues: Vec<RowIssue>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub total: u32,
    pub processed: u32,
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl JobCounts {
    pub fn new(total: u32) -> Self {
        Self { total, ..Default::default() }
    }

    /// Percentage of rows decided, 0-100
    pub fn progress(&self) -> i32 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed.min(self.total) as u64 * 100) / self.total as u64) as i32
    }

    pub fn record_success(&mut self) {
        self.success += 1;
        self.processed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
        self.processed += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
        self.processed += 1;
    }
}

/// Raw rows stored against a job
#[derive(Debug, Clone, Default)]
pub struct JobData {
    pub rows: Vec<SheetRecord>,
    pub default_branch: Option<String>,
    pub data_stored: bool,
}

/// Partial ledger write; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<ImportJobStatus>,
    pub counts: Option<JobCounts>,
    pub issues: Option<Vec<RowIssue>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Snapshot pushed to observers on every ledger write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobStatusUpdate {
    pub job_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub job: ImportJob,
}

impl ImportJobStatusUpdate {
    pub fn new(job: ImportJob) -> Self {
        Self {
            job_id: job.id,
            timestamp: Utc::now(),
            job,
        }
    }
}

// ==========================================================================
// Request / response payloads
// ==========================================================================

/// Spreadsheet upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub file_base64: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub total_rows: usize,
    pub message: String,
}

/// Trigger processing of a stored job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessJobRequest {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessJobResponse {
    pub success: bool,
    pub message: String,
    pub status: ImportJobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetJobRequest {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryRequest {
    pub limit: Option<i64>,
    /// Only jobs in this state
    pub status: Option<ImportJobStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryResponse {
    pub jobs: Vec<ImportJob>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ImportJobStatus::Importing).unwrap();
        assert_eq!(json, "\"importing\"");
    }

    #[test]
    fn test_running_and_claimable_states() {
        assert!(ImportJobStatus::Processing.is_running());
        assert!(ImportJobStatus::Importing.is_running());
        assert!(!ImportJobStatus::Completed.is_running());

        assert!(ImportJobStatus::Pending.is_claimable());
        assert!(ImportJobStatus::Failed.is_claimable());
        assert!(!ImportJobStatus::Completed.is_claimable());
        assert!(!ImportJobStatus::Importing.is_claimable());
    }

    #[test]
    fn test_progress_rounds_down() {
        let mut counts = JobCounts::new(3);
        assert_eq!(counts.progress(), 0);
        counts.record_success();
        assert_eq!(counts.progress(), 33);
        counts.record_skip();
        counts.record_failure();
        assert_eq!(counts.progress(), 100);
        assert_eq!(counts.processed, 3);
    }

    #[test]
    fn test_empty_job_reports_full_progress() {
        assert_eq!(JobCounts::new(0).progress(), 100);
    }

    #[test]
    fn test_history_request_status_filter_is_optional() {
        let request: ImportHistoryRequest = serde_json::from_str("{}").unwrap();
        assert!(request.status.is_none());

        let request: ImportHistoryRequest =
            serde_json::from_str(r#"{"limit":5,"status":"failed"}"#).unwrap();
        assert_eq!(request.limit, Some(5));
        assert_eq!(request.status, Some(ImportJobStatus::Failed));
    }

    #[test]
    fn test_upload_request_default_branch_optional() {
        let json = r#"{"fileName":"clients.xlsx","fileBase64":"AAAA"}"#;
        let request: UploadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.file_name, "clients.xlsx");
        assert!(request.default_branch.is_none());
    }
}
