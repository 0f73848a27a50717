//! Import pipeline errors
//!
//! Every variant maps to a wire error code and a status class; handlers turn
//! them into `ErrorResponse` payloads.

use thiserror::Error;
use uuid::Uuid;

use crate::services::payload::PayloadError;
use crate::services::store::StoreError;
use crate::types::status_for_code;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid file type. Please upload an Excel file (.xlsx, .xls, .xlsm, .xlsb, .ods)")]
    InvalidFileType,

    #[error("File is too large ({size} bytes, maximum is {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Excel file is empty or has no data")]
    EmptyFile,

    #[error("Failed to parse Excel file: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("No data found in job. Please re-upload the file.")]
    NoData,

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Failed to process job: {0}")]
    Processing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PayloadError> for ImportError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Empty => ImportError::MissingField("fileBase64"),
            PayloadError::TooLarge { size, max } => ImportError::FileTooLarge { size, max },
            PayloadError::InvalidBase64(_) => ImportError::InvalidRequest(err.to_string()),
        }
    }
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::InvalidRequest(_) => "INVALID_REQUEST",
            ImportError::InvalidFileType => "INVALID_FILE_TYPE",
            ImportError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ImportError::EmptyFile => "EMPTY_FILE",
            ImportError::Parse(_) => "PARSE_ERROR",
            ImportError::MissingField(_) => "MISSING_FIELD",
            ImportError::NoData => "NO_DATA",
            ImportError::JobNotFound(_) => "NOT_FOUND",
            ImportError::Processing(_) => "PROCESSING_FAILED",
            ImportError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn status(&self) -> u16 {
        status_for_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        assert_eq!(ImportError::InvalidFileType.status(), 400);
        assert_eq!(ImportError::EmptyFile.status(), 400);
        assert_eq!(ImportError::NoData.status(), 400);
        assert_eq!(ImportError::MissingField("fileName").status(), 400);
        assert_eq!(ImportError::FileTooLarge { size: 20, max: 10 }.status(), 400);
    }

    #[test]
    fn test_missing_job_maps_to_404() {
        let err = ImportError::JobNotFound(Uuid::nil());
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_server_errors_map_to_500() {
        assert_eq!(ImportError::Processing("boom".into()).status(), 500);
        let err: ImportError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.code(), "STORE_ERROR");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_no_data_message_asks_for_reupload() {
        assert_eq!(
            ImportError::NoData.to_string(),
            "No data found in job. Please re-upload the file."
        );
    }
}
