//! Membership document upload types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of membership document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Invoice,
    /// Proof of payment
    Pop,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Pop => "pop",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadRequest {
    pub client_id: Uuid,
    pub doc_type: DocumentType,
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub file_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadResponse {
    pub success: bool,
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
}
