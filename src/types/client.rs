//! Client types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Client entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub birth_month: i32,
    pub birth_day: i32,
    /// Month/day in the current year; kept for display only
    pub date_of_birth: NaiveDate,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical client ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDraft {
    pub name: String,
    pub phone_number: String,
    pub birth_month: u32,
    pub birth_day: u32,
    pub date_of_birth: NaiveDate,
    pub branch: String,
}

impl ClientDraft {
    /// Dedupe key: (phone number, branch), both trimmed
    pub fn dedupe_key(&self) -> (String, String) {
        (
            self.phone_number.trim().to_string(),
            self.branch.trim().to_string(),
        )
    }
}

/// Result of writing a client under the phone+branch uniqueness rule
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Client),
    Duplicate,
}

/// Result of rewriting an existing client
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    Updated(Client),
    /// Another client already has the phone in the target branch
    Duplicate,
    NotFound,
}

/// Request to create a single client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    pub phone_number: String,
    pub branch: String,
    /// Any date format accepted by the import normalizer
    pub date_of_birth: Option<String>,
    pub birth_month: Option<u32>,
    pub birth_day: Option<u32>,
}

/// Addresses one client (`spa.client.get`, `spa.client.delete`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdRequest {
    pub client_id: Uuid,
}

/// Edit of an existing client. Omitted branch and birthday keep their
/// stored values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    pub client_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub branch: Option<String>,
    pub date_of_birth: Option<String>,
    pub birth_month: Option<u32>,
    pub birth_day: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteClientResponse {
    pub success: bool,
    pub client_id: Uuid,
}

/// Filter for client listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClientsRequest {
    pub search: Option<String>,
    /// Only "today" is recognized
    pub birthdays: Option<String>,
    pub branch: Option<String>,
}

/// Resolved client query handed to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientQuery {
    pub search: Option<String>,
    /// (month, day) to match
    pub birthday: Option<(u32, u32)>,
    pub branch: Option<String>,
}

/// Contact links derived from a client's phone number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLinks {
    pub tel: String,
    pub whatsapp: String,
}

/// Client list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListItem {
    #[serde(flatten)]
    pub client: Client,
    pub contact: Option<ContactLinks>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListResponse {
    pub clients: Vec<ClientListItem>,
}

/// Duplicate phone check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDuplicateRequest {
    pub phone_number: String,
    pub branch: Option<String>,
    /// Ignore this client, so an edit does not collide with itself
    pub exclude_client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDuplicateResponse {
    pub exists: bool,
}
