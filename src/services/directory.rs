//! Client and branch directory
//!
//! Single-client operations share the import's duplicate rule: a phone number
//! is unique within its branch.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;
use tracing::{debug, info};

use crate::services::normalizer::{is_valid_month_day, parse_birthday_text, synthetic_birth_date};
use crate::services::phone::contact_links;
use crate::services::store::{Store, StoreError};
use uuid::Uuid;

use crate::types::{
    status_for_code, Branch, CheckDuplicateRequest, Client, ClientDraft, ClientListItem,
    ClientQuery, CreateClientRequest, InsertOutcome, ListClientsRequest, UpdateClientRequest,
    UpdateOutcome,
};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Branch \"{0}\" does not exist")]
    InvalidBranch(String),

    #[error("Phone number \"{phone}\" already exists in branch \"{branch}\"")]
    DuplicatePhone { phone: String, branch: String },

    #[error("Branch \"{0}\" already exists")]
    DuplicateBranch(String),

    #[error("Client {0} not found")]
    ClientNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DirectoryError {
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::MissingField(_) => "MISSING_FIELD",
            DirectoryError::InvalidRequest(_) => "INVALID_REQUEST",
            DirectoryError::InvalidBranch(_) => "INVALID_BRANCH",
            DirectoryError::DuplicatePhone { .. } => "DUPLICATE_PHONE",
            DirectoryError::DuplicateBranch(_) => "DUPLICATE_BRANCH",
            DirectoryError::ClientNotFound(_) => "NOT_FOUND",
            DirectoryError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn status(&self) -> u16 {
        status_for_code(self.code())
    }
}

pub struct ClientDirectory {
    store: Arc<dyn Store>,
}

impl ClientDirectory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Search, birthday and branch filters combine; `today` resolves
    /// `birthdays: "today"`.
    pub async fn list_clients(
        &self,
        request: &ListClientsRequest,
        today: NaiveDate,
    ) -> Result<Vec<ClientListItem>, DirectoryError> {
        let birthday = match request.birthdays.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) if v.eq_ignore_ascii_case("today") => Some((today.month(), today.day())),
            Some(other) => {
                return Err(DirectoryError::InvalidRequest(format!(
                    "Unsupported birthdays filter '{}', expected 'today'",
                    other
                )))
            }
        };

        let query = ClientQuery {
            search: non_empty(request.search.as_deref()),
            birthday,
            branch: non_empty(request.branch.as_deref()),
        };

        let clients = self.store.list_clients(&query).await?;
        debug!("Client list returned {} entries", clients.len());

        Ok(clients
            .into_iter()
            .map(|client| ClientListItem {
                contact: contact_links(&client.phone_number),
                client,
            })
            .collect())
    }

    pub async fn create_client(
        &self,
        request: &CreateClientRequest,
        year: i32,
    ) -> Result<Client, DirectoryError> {
        let name = required(&request.name, "name")?;
        let phone = required(&request.phone_number, "phoneNumber")?;
        let branch = required(&request.branch, "branch")?;
        let (month, day) = birthday_of(
            request.birth_month,
            request.birth_day,
            request.date_of_birth.as_deref(),
        )?
        .ok_or(DirectoryError::MissingField("dateOfBirth"))?;

        if !self.branch_exists(branch).await? {
            return Err(DirectoryError::InvalidBranch(branch.to_string()));
        }

        let draft = ClientDraft {
            name: name.to_string(),
            phone_number: phone.to_string(),
            birth_month: month,
            birth_day: day,
            date_of_birth: synthetic_birth_date(year, month, day),
            branch: branch.to_string(),
        };

        match self.store.insert_client(&draft).await? {
            InsertOutcome::Inserted(client) => {
                info!("Created client {} in branch {}", client.id, client.branch);
                Ok(client)
            }
            InsertOutcome::Duplicate => Err(DirectoryError::DuplicatePhone {
                phone: draft.phone_number,
                branch: draft.branch,
            }),
        }
    }

    pub async fn get_client(&self, id: Uuid) -> Result<Client, DirectoryError> {
        self.store
            .get_client(id)
            .await?
            .ok_or(DirectoryError::ClientNotFound(id))
    }

    /// Rewrite name and phone; branch and birthday change only when given.
    /// The phone stays unique within the (possibly new) branch, ignoring the
    /// client itself.
    pub async fn update_client(
        &self,
        request: &UpdateClientRequest,
        year: i32,
    ) -> Result<Client, DirectoryError> {
        let id = request.client_id;
        let name = required(&request.name, "name")?;
        let phone = required(&request.phone_number, "phoneNumber")?;
        let birthday = birthday_of(
            request.birth_month,
            request.birth_day,
            request.date_of_birth.as_deref(),
        )?;
        let current = self.get_client(id).await?;

        let branch = match non_empty(request.branch.as_deref()) {
            Some(branch) => {
                if !self.branch_exists(&branch).await? {
                    return Err(DirectoryError::InvalidBranch(branch));
                }
                branch
            }
            None => current.branch.clone(),
        };

        let (birth_month, birth_day, date_of_birth) = match birthday {
            Some((month, day)) => (month, day, synthetic_birth_date(year, month, day)),
            None => (
                current.birth_month as u32,
                current.birth_day as u32,
                current.date_of_birth,
            ),
        };

        if self
            .store
            .find_client_by_phone(phone, Some(&branch), Some(id))
            .await?
            .is_some()
        {
            return Err(DirectoryError::DuplicatePhone {
                phone: phone.to_string(),
                branch,
            });
        }

        let draft = ClientDraft {
            name: name.to_string(),
            phone_number: phone.to_string(),
            birth_month,
            birth_day,
            date_of_birth,
            branch,
        };

        match self.store.update_client(id, &draft).await? {
            UpdateOutcome::Updated(client) => {
                info!("Updated client {}", client.id);
                Ok(client)
            }
            UpdateOutcome::Duplicate => Err(DirectoryError::DuplicatePhone {
                phone: draft.phone_number,
                branch: draft.branch,
            }),
            UpdateOutcome::NotFound => Err(DirectoryError::ClientNotFound(id)),
        }
    }

    pub async fn delete_client(&self, id: Uuid) -> Result<(), DirectoryError> {
        if !self.store.delete_client(id).await? {
            return Err(DirectoryError::ClientNotFound(id));
        }
        info!("Deleted client {}", id);
        Ok(())
    }

    /// Whether a client with this phone exists, optionally within one branch
    /// and ignoring `excludeClientId`
    pub async fn check_duplicate(&self, request: &CheckDuplicateRequest) -> Result<bool, DirectoryError> {
        let phone = required(&request.phone_number, "phoneNumber")?;
        let branch = non_empty(request.branch.as_deref());
        let found = self
            .store
            .find_client_by_phone(phone, branch.as_deref(), request.exclude_client_id)
            .await?;
        Ok(found.is_some())
    }

    pub async fn list_branches(&self) -> Result<Vec<Branch>, DirectoryError> {
        Ok(self.store.list_branches().await?)
    }

    pub async fn create_branch(&self, name: &str) -> Result<Branch, DirectoryError> {
        let name = required(name, "name")?;
        match self.store.create_branch(name).await? {
            Some(branch) => {
                info!("Created branch {}", branch.name);
                Ok(branch)
            }
            None => Err(DirectoryError::DuplicateBranch(name.to_string())),
        }
    }

    async fn branch_exists(&self, name: &str) -> Result<bool, StoreError> {
        let branches = self.store.list_branches().await?;
        Ok(branches.iter().any(|b| b.name == name))
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, DirectoryError> {
    match value.trim() {
        "" => Err(DirectoryError::MissingField(field)),
        trimmed => Ok(trimmed),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Explicit month/day wins over a date string
/// `None` when neither is given
fn birthday_of(
    month: Option<u32>,
    day: Option<u32>,
    date_of_birth: Option<&str>,
) -> Result<Option<(u32, u32)>, DirectoryError> {
    if let (Some(month), Some(day)) = (month, day) {
        if is_valid_month_day(month, day) {
            return Ok(Some((month, day)));
        }
        return Err(DirectoryError::InvalidRequest(format!(
            "Invalid birthday {}/{}",
            month, day
        )));
    }

    match date_of_birth.map(str::trim) {
        Some(text) if !text.is_empty() => parse_birthday_text(text).map(Some).ok_or_else(|| {
            DirectoryError::InvalidRequest(format!("Unrecognized date of birth '{}'", text))
        }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;

    fn directory() -> (Arc<MemoryStore>, ClientDirectory) {
        let store = Arc::new(MemoryStore::with_branches(&["Downtown", "Uptown"]));
        (store.clone(), ClientDirectory::new(store))
    }

    fn create(name: &str, phone: &str, branch: &str, dob: &str) -> CreateClientRequest {
        CreateClientRequest {
            name: name.into(),
            phone_number: phone.into(),
            branch: branch.into(),
            date_of_birth: Some(dob.into()),
            birth_month: None,
            birth_day: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    #[tokio::test]
    async fn test_create_client_trims_and_keeps_birthday() {
        let (_, dir) = directory();
        let client = dir
            .create_client(&create("  Ann Lee ", " 0821234567 ", "Downtown", "1990-03-15"), 2026)
            .await
            .unwrap();
        assert_eq!(client.name, "Ann Lee");
        assert_eq!(client.phone_number, "0821234567");
        assert_eq!((client.birth_month, client.birth_day), (3, 15));
        assert_eq!(client.date_of_birth, NaiveDate::from_ymd_opt(2026, 3, 15).unwrap());
    }

    #[tokio::test]
    async fn test_create_client_with_explicit_month_day() {
        let (_, dir) = directory();
        let mut request = create("Ann", "555", "Downtown", "");
        request.birth_month = Some(2);
        request.birth_day = Some(29);
        let client = dir.create_client(&request, 2026).await.unwrap();
        assert_eq!((client.birth_month, client.birth_day), (2, 29));

        request.birth_day = Some(30);
        let err = dir.create_client(&request, 2026).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_create_client_rejects_unknown_branch_and_duplicates() {
        let (_, dir) = directory();
        let err = dir
            .create_client(&create("Ann", "555", "Harbour", "3/15"), 2026)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_BRANCH");
        assert_eq!(err.status(), 400);

        dir.create_client(&create("Ann", "555", "Downtown", "3/15"), 2026)
            .await
            .unwrap();
        let err = dir
            .create_client(&create("Ann B", "555", "Downtown", "4/16"), 2026)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_PHONE");
        assert_eq!(err.status(), 409);

        // Same phone in another branch is a different client
        dir.create_client(&create("Ann", "555", "Uptown", "3/15"), 2026)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_client_requires_fields() {
        let (_, dir) = directory();
        let err = dir
            .create_client(&create("Ann", " ", "Downtown", "3/15"), 2026)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::MissingField("phoneNumber")));

        let mut request = create("Ann", "555", "Downtown", "3/15");
        request.date_of_birth = None;
        let err = dir.create_client(&request, 2026).await.unwrap_err();
        assert!(matches!(err, DirectoryError::MissingField("dateOfBirth")));
    }

    #[tokio::test]
    async fn test_list_today_birthdays_with_contact_links() {
        let (_, dir) = directory();
        dir.create_client(&create("Ann", "+27 82 123 4567", "Downtown", "1990-03-15"), 2026)
            .await
            .unwrap();
        dir.create_client(&create("Bob", "0825550000", "Downtown", "1990-04-01"), 2026)
            .await
            .unwrap();

        let request = ListClientsRequest {
            birthdays: Some("today".into()),
            ..Default::default()
        };
        let items = dir.list_clients(&request, today()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].client.name, "Ann");
        let contact = items[0].contact.as_ref().unwrap();
        assert_eq!(contact.tel, "tel:+27821234567");

        let all = dir.list_clients(&ListClientsRequest::default(), today()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_birthday_filter() {
        let (_, dir) = directory();
        let request = ListClientsRequest {
            birthdays: Some("tomorrow".into()),
            ..Default::default()
        };
        let err = dir.list_clients(&request, today()).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_check_duplicate_scopes_to_branch() {
        let (_, dir) = directory();
        dir.create_client(&create("Ann", "555", "Downtown", "3/15"), 2026)
            .await
            .unwrap();

        let check = |branch: Option<&str>| CheckDuplicateRequest {
            phone_number: " 555 ".into(),
            branch: branch.map(str::to_string),
            exclude_client_id: None,
        };
        assert!(dir.check_duplicate(&check(None)).await.unwrap());
        assert!(dir.check_duplicate(&check(Some("Downtown"))).await.unwrap());
        assert!(!dir.check_duplicate(&check(Some("Uptown"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_branch_rejects_duplicates() {
        let (_, dir) = directory();
        let branch = dir.create_branch("  Harbour ").await.unwrap();
        assert_eq!(branch.name, "Harbour");
        let err = dir.create_branch("Harbour").await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_BRANCH");
        assert!(matches!(
            dir.create_branch(" ").await,
            Err(DirectoryError::MissingField("name"))
        ));
        let names: Vec<String> = dir
            .list_branches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["Downtown", "Harbour", "Uptown"]);
    }

    fn update(client_id: Uuid, name: &str, phone: &str) -> UpdateClientRequest {
        UpdateClientRequest {
            client_id,
            name: name.into(),
            phone_number: phone.into(),
            branch: None,
            date_of_birth: None,
            birth_month: None,
            birth_day: None,
        }
    }

    #[tokio::test]
    async fn test_update_keeps_branch_and_birthday_unless_given() {
        let (_, dir) = directory();
        let ann = dir
            .create_client(&create("Ann", "555", "Downtown", "1990-03-15"), 2026)
            .await
            .unwrap();

        let updated = dir
            .update_client(&update(ann.id, " Ann Smith ", "555"), 2026)
            .await
            .unwrap();
        assert_eq!(updated.name, "Ann Smith");
        assert_eq!(updated.branch, "Downtown");
        assert_eq!((updated.birth_month, updated.birth_day), (3, 15));

        let mut request = update(ann.id, "Ann Smith", "555");
        request.branch = Some("Uptown".into());
        request.date_of_birth = Some("4/16".into());
        let moved = dir.update_client(&request, 2026).await.unwrap();
        assert_eq!(moved.branch, "Uptown");
        assert_eq!((moved.birth_month, moved.birth_day), (4, 16));
        assert_eq!(moved.date_of_birth, NaiveDate::from_ymd_opt(2026, 4, 16).unwrap());
        assert_eq!(dir.get_client(ann.id).await.unwrap().branch, "Uptown");
    }

    #[tokio::test]
    async fn test_update_rejects_other_clients_phone_and_unknown_branch() {
        let (_, dir) = directory();
        let ann = dir
            .create_client(&create("Ann", "555", "Downtown", "3/15"), 2026)
            .await
            .unwrap();
        dir.create_client(&create("Bob", "556", "Downtown", "4/16"), 2026)
            .await
            .unwrap();

        let err = dir
            .update_client(&update(ann.id, "Ann", "556"), 2026)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_PHONE");

        let mut request = update(ann.id, "Ann", "555");
        request.branch = Some("Harbour".into());
        let err = dir.update_client(&request, 2026).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_BRANCH");

        let err = dir
            .update_client(&update(Uuid::new_v4(), "Nobody", "557"), 2026)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_check_duplicate_can_exclude_the_edited_client() {
        let (_, dir) = directory();
        let ann = dir
            .create_client(&create("Ann", "555", "Downtown", "3/15"), 2026)
            .await
            .unwrap();
        let request = CheckDuplicateRequest {
            phone_number: "555".into(),
            branch: Some("Downtown".into()),
            exclude_client_id: Some(ann.id),
        };
        assert!(!dir.check_duplicate(&request).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_and_delete_client() {
        let (store, dir) = directory();
        let ann = dir
            .create_client(&create("Ann", "555", "Downtown", "3/15"), 2026)
            .await
            .unwrap();
        assert_eq!(dir.get_client(ann.id).await.unwrap().name, "Ann");

        dir.delete_client(ann.id).await.unwrap();
        assert_eq!(store.client_count(), 0);
        assert!(matches!(
            dir.get_client(ann.id).await,
            Err(DirectoryError::ClientNotFound(id)) if id == ann.id
        ));
        let err = dir.delete_client(ann.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_store_outage_is_store_error() {
        let (store, dir) = directory();
        store.set_unavailable(true);
        let err = dir.list_branches().await.unwrap_err();
        assert_eq!(err.code(), "STORE_ERROR");
        assert_eq!(err.status(), 500);
    }
}
