//! Membership documents
//!
//! Invoices and proofs of payment are stored under
//! `memberships/<clientId>/<type>/<millis>_<name>` in a blob store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::services::payload::{self, PayloadError};
use crate::types::{status_for_code, DocumentUploadRequest, DocumentUploadResponse};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Failed to store document: {0}")]
    Storage(String),
}

impl DocumentError {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::MissingField(_) | DocumentError::Payload(PayloadError::Empty) => {
                "MISSING_FIELD"
            }
            DocumentError::Payload(PayloadError::TooLarge { .. }) => "FILE_TOO_LARGE",
            DocumentError::Payload(PayloadError::InvalidBase64(_)) => "INVALID_REQUEST",
            DocumentError::Storage(_) => "STORE_ERROR",
        }
    }

    pub fn status(&self) -> u16 {
        status_for_code(self.code())
    }
}

/// Key/value blob storage returning a public URL per object
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Blobs as files under a root directory, served from `base_url`
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let path = self.root.join(key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Stored {} ({} bytes, {})", path.display(), bytes.len(), content_type);
        Ok(self.url_for(key))
    }
}

pub struct DocumentService {
    blobs: Arc<dyn BlobStore>,
    max_bytes: usize,
}

impl DocumentService {
    pub fn new(blobs: Arc<dyn BlobStore>, max_bytes: usize) -> Self {
        Self { blobs, max_bytes }
    }

    pub async fn upload(
        &self,
        request: DocumentUploadRequest,
    ) -> Result<DocumentUploadResponse, DocumentError> {
        let file_name = request.file_name.trim();
        if file_name.is_empty() {
            return Err(DocumentError::MissingField("fileName"));
        }
        let bytes = payload::decode_file(&request.file_base64, self.max_bytes)?;

        let content_type = request
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(file_name).to_string());

        let key = format!(
            "memberships/{}/{}/{}_{}",
            request.client_id,
            request.doc_type.as_str(),
            Utc::now().timestamp_millis(),
            sanitize_file_name(file_name)
        );

        let url = self
            .blobs
            .put(&key, &bytes, &content_type)
            .await
            .map_err(|e| DocumentError::Storage(format!("{:#}", e)))?;

        info!(
            "Stored {} for client {} ({} bytes)",
            request.doc_type.as_str(),
            request.client_id,
            bytes.len()
        );

        Ok(DocumentUploadResponse {
            success: true,
            url,
            name: file_name.to_string(),
            content_type,
        })
    }
}

/// Base name with anything outside `[A-Za-z0-9._-]` replaced by `_`
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "file".to_string(),
        rest => rest.to_string(),
    }
}

fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use uuid::Uuid;

    use crate::types::DocumentType;

    fn request(client_id: Uuid, file_name: &str, body: &[u8]) -> DocumentUploadRequest {
        DocumentUploadRequest {
            client_id,
            doc_type: DocumentType::Pop,
            file_name: file_name.to_string(),
            content_type: None,
            file_base64: STANDARD.encode(body),
        }
    }

    #[tokio::test]
    async fn test_upload_writes_under_membership_path() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::new(dir.path(), "/documents/"));
        let service = DocumentService::new(blobs, 1024);
        let client_id = Uuid::new_v4();

        let response = service
            .upload(request(client_id, "receipt march.pdf", b"%PDF-1.4"))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.name, "receipt march.pdf");
        assert_eq!(response.content_type, "application/pdf");
        let prefix = format!("/documents/memberships/{}/pop/", client_id);
        assert!(response.url.starts_with(&prefix), "{}", response.url);
        assert!(response.url.ends_with("_receipt_march.pdf"));

        let stored_dir = dir.path().join(format!("memberships/{}/pop", client_id));
        let entries: Vec<_> = std::fs::read_dir(stored_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let stored = std::fs::read(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(stored, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_upload_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let service = DocumentService::new(Arc::new(LocalBlobStore::new(dir.path(), "")), 4);

        let err = service.upload(request(Uuid::new_v4(), " ", b"x")).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");

        let err = service
            .upload(request(Uuid::new_v4(), "big.pdf", b"too large"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FILE_TOO_LARGE");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\inv 1.pdf"), "inv_1.pdf");
        assert_eq!(sanitize_file_name(".."), "file");
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let store = LocalBlobStore::new("/tmp", "https://cdn.example.com/docs");
        assert_eq!(
            store.url_for("memberships/a b/pop/1_x.pdf"),
            "https://cdn.example.com/docs/memberships/a%20b/pop/1_x.pdf"
        );
    }
}
