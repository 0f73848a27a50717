//! In-memory store
//!
//! Implements the same rules as the PostgreSQL backend (unique phone per
//! branch, conditional job claim) under a single lock. Used for local
//! development and as the test double throughout the crate.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::services::store::{ClientStore, JobStore, StoreError, StoreResult};
use crate::types::{
    Branch, Client, ClientDraft, ClientQuery, ImportJob, ImportJobStatus, InsertOutcome, JobData,
    JobUpdate, SheetRecord, UpdateOutcome,
};

#[derive(Default)]
struct Inner {
    branches: Vec<Branch>,
    clients: Vec<Client>,
    jobs: HashMap<Uuid, ImportJob>,
    job_data: HashMap<Uuid, JobData>,
    // Fault injection
    rejected_phones: Vec<String>,
    unavailable: bool,
    unavailable_inserts: bool,
    failing_lookups: bool,
    rejected_progress: bool,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn with_branches<S: AsRef<str>>(names: &[S]) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for name in names {
                let name = name.as_ref().trim();
                if !name.is_empty() && !inner.branches.iter().any(|b| b.name == name) {
                    inner.branches.push(new_branch(name));
                }
            }
        }
        store
    }

    /// Make every insert of this phone fail with a rejection
    #[cfg(test)]
    pub fn reject_inserts_for(&self, phone: &str) {
        self.inner.write().rejected_phones.push(phone.to_string());
    }

    /// Make every client operation fail as if the store were unreachable
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable = unavailable;
    }

    /// Make client inserts fail as if the store dropped mid-import
    #[cfg(test)]
    pub fn set_inserts_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable_inserts = unavailable;
    }

    /// Make duplicate lookups fail with a rejection
    #[cfg(test)]
    pub fn set_failing_lookups(&self, failing: bool) {
        self.inner.write().failing_lookups = failing;
    }

    /// Make `processing`/`importing` job updates fail with a rejection
    #[cfg(test)]
    pub fn set_rejected_progress(&self, rejected: bool) {
        self.inner.write().rejected_progress = rejected;
    }

    /// Remove stored rows while keeping the job, as if the second write never landed
    #[cfg(test)]
    pub fn forget_job_data(&self, job_id: Uuid) {
        let mut inner = self.inner.write();
        inner.job_data.remove(&job_id);
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.data_stored = false;
        }
    }

    /// Overwrite a job's status directly
    #[cfg(test)]
    pub fn force_status(&self, job_id: Uuid, status: ImportJobStatus) {
        if let Some(job) = self.inner.write().jobs.get_mut(&job_id) {
            job.status = status;
        }
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.inner.read().clients.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_branch(name: &str) -> Branch {
    Branch {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: Utc::now(),
    }
}

fn check_available(inner: &Inner) -> StoreResult<()> {
    if inner.unavailable {
        return Err(StoreError::Unavailable("memory store switched off".into()));
    }
    Ok(())
}

fn matches_query(client: &Client, query: &ClientQuery) -> bool {
    if let Some(ref branch) = query.branch {
        if client.branch != *branch {
            return false;
        }
    }
    if let Some((month, day)) = query.birthday {
        if client.birth_month != month as i32 || client.birth_day != day as i32 {
            return false;
        }
    }
    if let Some(ref search) = query.search {
        let needle = search.trim().to_lowercase();
        if !needle.is_empty() {
            let dob = client.date_of_birth.format("%Y-%m-%d").to_string();
            return client.name.to_lowercase().contains(&needle)
                || client.phone_number.contains(&needle)
                || dob.contains(&needle);
        }
    }
    true
}

fn apply_update(job: &mut ImportJob, update: &JobUpdate) {
    if let Some(status) = update.status {
        job.status = status;
    }
    if let Some(counts) = update.counts {
        job.total = counts.total as i32;
        job.processed = counts.processed as i32;
        job.success = counts.success as i32;
        job.failed = counts.failed as i32;
        job.skipped = counts.skipped as i32;
        job.progress = counts.progress();
    }
    if let Some(ref issues) = update.issues {
        job.issues = issues.clone();
    }
    if let Some(ref message) = update.message {
        job.message = Some(message.clone());
    }
    if let Some(ref error) = update.error {
        job.error = Some(error.clone());
    }
    job.updated_at = Utc::now();
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn list_branches(&self) -> StoreResult<Vec<Branch>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        let mut branches = inner.branches.clone();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    async fn create_branch(&self, name: &str) -> StoreResult<Option<Branch>> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        let name = name.trim();
        if inner.branches.iter().any(|b| b.name == name) {
            return Ok(None);
        }
        let branch = new_branch(name);
        inner.branches.push(branch.clone());
        Ok(Some(branch))
    }

    async fn find_client_by_phone(
        &self,
        phone: &str,
        branch: Option<&str>,
        exclude: Option<Uuid>,
    ) -> StoreResult<Option<Uuid>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        if inner.failing_lookups {
            return Err(StoreError::Rejected("lookup failed".into()));
        }
        let phone = phone.trim();
        Ok(inner
            .clients
            .iter()
            .filter(|c| Some(c.id) != exclude)
            .find(|c| c.phone_number == phone && branch.map_or(true, |b| c.branch == b.trim()))
            .map(|c| c.id))
    }

    async fn insert_client(&self, draft: &ClientDraft) -> StoreResult<InsertOutcome> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        if inner.unavailable_inserts {
            return Err(StoreError::Unavailable("connection lost".into()));
        }
        let phone = draft.phone_number.trim();
        let branch = draft.branch.trim();

        if inner.rejected_phones.iter().any(|p| p == phone) {
            return Err(StoreError::Rejected(format!("insert refused for {}", phone)));
        }
        if inner
            .clients
            .iter()
            .any(|c| c.phone_number == phone && c.branch == branch)
        {
            return Ok(InsertOutcome::Duplicate);
        }

        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            name: draft.name.trim().to_string(),
            phone_number: phone.to_string(),
            birth_month: draft.birth_month as i32,
            birth_day: draft.birth_day as i32,
            date_of_birth: draft.date_of_birth,
            branch: branch.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.clients.push(client.clone());
        Ok(InsertOutcome::Inserted(client))
    }

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        Ok(inner.clients.iter().find(|c| c.id == id).cloned())
    }

    async fn update_client(&self, id: Uuid, draft: &ClientDraft) -> StoreResult<UpdateOutcome> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        let phone = draft.phone_number.trim();
        let branch = draft.branch.trim();

        if inner
            .clients
            .iter()
            .any(|c| c.id != id && c.phone_number == phone && c.branch == branch)
        {
            return Ok(UpdateOutcome::Duplicate);
        }
        let Some(client) = inner.clients.iter_mut().find(|c| c.id == id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        client.name = draft.name.trim().to_string();
        client.phone_number = phone.to_string();
        client.birth_month = draft.birth_month as i32;
        client.birth_day = draft.birth_day as i32;
        client.date_of_birth = draft.date_of_birth;
        client.branch = branch.to_string();
        client.updated_at = Utc::now();
        Ok(UpdateOutcome::Updated(client.clone()))
    }

    async fn delete_client(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        let before = inner.clients.len();
        inner.clients.retain(|c| c.id != id);
        Ok(inner.clients.len() < before)
    }

    async fn list_clients(&self, query: &ClientQuery) -> StoreResult<Vec<Client>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        // Insertion order is creation order; newest first
        Ok(inner
            .clients
            .iter()
            .rev()
            .filter(|c| matches_query(c, query))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, file_name: &str, user_id: Option<&str>) -> StoreResult<ImportJob> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        let now = Utc::now();
        let job = ImportJob {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            user_id: user_id.map(str::to_string),
            status: ImportJobStatus::Pending,
            progress: 0,
            total: 0,
            processed: 0,
            success: 0,
            failed: 0,
            skipped: 0,
            default_branch: None,
            data_stored: false,
            issues: Vec::new(),
            error: None,
            message: None,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn store_job_data(
        &self,
        job_id: Uuid,
        rows: &[SheetRecord],
        default_branch: Option<&str>,
    ) -> StoreResult<ImportJob> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        let job = inner.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        job.total = rows.len() as i32;
        job.default_branch = default_branch.map(str::to_string);
        job.data_stored = true;
        job.updated_at = Utc::now();
        let job = job.clone();
        inner.job_data.insert(
            job_id,
            JobData {
                rows: rows.to_vec(),
                default_branch: default_branch.map(str::to_string),
                data_stored: true,
            },
        );
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn load_job_data(&self, job_id: Uuid) -> StoreResult<Option<JobData>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        Ok(inner.job_data.get(&job_id).cloned())
    }

    async fn claim_job(&self, job_id: Uuid) -> StoreResult<Option<ImportJob>> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        let job = match inner.jobs.get_mut(&job_id) {
            Some(job) if job.status.is_claimable() && job.data_stored => job,
            _ => return Ok(None),
        };
        job.status = ImportJobStatus::Processing;
        job.progress = 0;
        job.processed = 0;
        job.success = 0;
        job.failed = 0;
        job.skipped = 0;
        job.issues.clear();
        job.error = None;
        job.message = None;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> StoreResult<ImportJob> {
        let mut inner = self.inner.write();
        check_available(&inner)?;
        if inner.rejected_progress && update.status.is_some_and(|s| s.is_running()) {
            return Err(StoreError::Rejected("progress write refused".into()));
        }
        let job = inner.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        apply_update(job, update);
        Ok(job.clone())
    }

    async fn list_jobs(
        &self,
        limit: i64,
        status: Option<ImportJobStatus>,
    ) -> StoreResult<Vec<ImportJob>> {
        let inner = self.inner.read();
        check_available(&inner)?;
        let mut jobs: Vec<ImportJob> = inner
            .jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::types::{CellValue, JobCounts, SheetRow};

    fn draft(phone: &str, branch: &str) -> ClientDraft {
        ClientDraft {
            name: "Ann Lee".into(),
            phone_number: phone.into(),
            birth_month: 3,
            birth_day: 15,
            date_of_birth: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            branch: branch.into(),
        }
    }

    fn row() -> SheetRecord {
        let mut row = SheetRow::new();
        row.insert("Name".into(), CellValue::Text("Ann".into()));
        SheetRecord::new(2, row)
    }

    #[tokio::test]
    async fn test_seeded_branches_are_listed_sorted() {
        let store = MemoryStore::with_branches(&["Uptown", "Downtown", "Uptown", " "]);
        let names: Vec<String> = store
            .list_branches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["Downtown", "Uptown"]);
    }

    #[tokio::test]
    async fn test_create_branch_refuses_duplicate_name() {
        let store = MemoryStore::new();
        assert!(store.create_branch("Downtown").await.unwrap().is_some());
        assert!(store.create_branch("Downtown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_enforces_phone_unique_per_branch() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert_client(&draft("555", "Downtown")).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert!(matches!(
            store.insert_client(&draft(" 555 ", "Downtown")).await.unwrap(),
            InsertOutcome::Duplicate
        ));
        // Same phone in another branch is a different client
        assert!(matches!(
            store.insert_client(&draft("555", "Uptown")).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert_eq!(store.client_count(), 2);
    }

    #[tokio::test]
    async fn test_find_by_phone_scopes_to_branch() {
        let store = MemoryStore::new();
        store.insert_client(&draft("555", "Downtown")).await.unwrap();
        assert!(store.find_client_by_phone("555", Some("Downtown"), None).await.unwrap().is_some());
        assert!(store.find_client_by_phone("555", Some("Uptown"), None).await.unwrap().is_none());
        assert!(store.find_client_by_phone("555", None, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_clients_filters_and_orders_newest_first() {
        let store = MemoryStore::new();
        store.insert_client(&draft("111", "Downtown")).await.unwrap();
        let mut other = draft("222", "Uptown");
        other.name = "Bob Stone".into();
        other.birth_month = 7;
        other.birth_day = 1;
        store.insert_client(&other).await.unwrap();

        let all = store.list_clients(&ClientQuery::default()).await.unwrap();
        assert_eq!(all[0].phone_number, "222");

        let by_name = ClientQuery { search: Some("bob".into()), ..Default::default() };
        assert_eq!(store.list_clients(&by_name).await.unwrap().len(), 1);

        let by_phone = ClientQuery { search: Some("11".into()), ..Default::default() };
        assert_eq!(store.list_clients(&by_phone).await.unwrap()[0].phone_number, "111");

        let by_birthday = ClientQuery { birthday: Some((3, 15)), ..Default::default() };
        assert_eq!(store.list_clients(&by_birthday).await.unwrap()[0].phone_number, "111");

        let by_branch = ClientQuery { branch: Some("Uptown".into()), ..Default::default() };
        assert_eq!(store.list_clients(&by_branch).await.unwrap()[0].phone_number, "222");
    }

    #[tokio::test]
    async fn test_claim_requires_stored_data() {
        let store = MemoryStore::new();
        let job = store.create_job("clients.xlsx", None).await.unwrap();
        assert!(store.claim_job(job.id).await.unwrap().is_none());

        store.store_job_data(job.id, &[row()], Some("Downtown")).await.unwrap();
        let claimed = store.claim_job(job.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, ImportJobStatus::Processing);
        assert_eq!(claimed.total, 1);

        // Second claim loses
        assert!(store.claim_job(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_job_can_be_reclaimed_with_reset_counts() {
        let store = MemoryStore::new();
        let job = store.create_job("clients.xlsx", None).await.unwrap();
        store.store_job_data(job.id, &[row()], None).await.unwrap();
        store.claim_job(job.id).await.unwrap();

        let mut counts = JobCounts::new(1);
        counts.record_failure();
        store
            .update_job(
                job.id,
                &JobUpdate {
                    status: Some(ImportJobStatus::Failed),
                    counts: Some(counts),
                    error: Some("store went away".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let reclaimed = store.claim_job(job.id).await.unwrap().unwrap();
        assert_eq!(reclaimed.failed, 0);
        assert_eq!(reclaimed.processed, 0);
        assert!(reclaimed.error.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.list_branches().await.unwrap_err();
        assert!(err.is_catastrophic());
    }

    #[tokio::test]
    async fn test_list_jobs_respects_limit() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store.create_job(&format!("f{}.xlsx", i), None).await.unwrap();
        }
        assert_eq!(store.list_jobs(2, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_status_before_limit() {
        let store = MemoryStore::new();
        let failed = store.create_job("old.xlsx", None).await.unwrap();
        store.force_status(failed.id, ImportJobStatus::Failed);
        for i in 0..3 {
            store.create_job(&format!("f{}.xlsx", i), None).await.unwrap();
        }

        let jobs = store.list_jobs(1, Some(ImportJobStatus::Failed)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, failed.id);
        assert!(store
            .list_jobs(10, Some(ImportJobStatus::Completed))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_find_by_phone_can_exclude_one_client() {
        let store = MemoryStore::new();
        let InsertOutcome::Inserted(ann) = store.insert_client(&draft("555", "Downtown")).await.unwrap() else {
            panic!("expected insert");
        };
        assert!(store
            .find_client_by_phone("555", Some("Downtown"), Some(ann.id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.find_client_by_phone("555", Some("Downtown"), Some(Uuid::new_v4())).await.unwrap(),
            Some(ann.id)
        );
    }

    #[tokio::test]
    async fn test_update_client_keeps_phone_unique_per_branch() {
        let store = MemoryStore::new();
        let InsertOutcome::Inserted(ann) = store.insert_client(&draft("555", "Downtown")).await.unwrap() else {
            panic!("expected insert");
        };
        store.insert_client(&draft("556", "Downtown")).await.unwrap();

        // Rewriting with its own phone is not a collision
        let mut edit = draft("555", "Downtown");
        edit.name = "Ann Smith".into();
        match store.update_client(ann.id, &edit).await.unwrap() {
            UpdateOutcome::Updated(client) => {
                assert_eq!(client.name, "Ann Smith");
                assert_eq!(client.created_at, ann.created_at);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            store.update_client(ann.id, &draft("556", "Downtown")).await.unwrap(),
            UpdateOutcome::Duplicate
        ));
        assert!(matches!(
            store.update_client(Uuid::new_v4(), &draft("557", "Downtown")).await.unwrap(),
            UpdateOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_get_and_delete_client() {
        let store = MemoryStore::new();
        let InsertOutcome::Inserted(ann) = store.insert_client(&draft("555", "Downtown")).await.unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(store.get_client(ann.id).await.unwrap().map(|c| c.id), Some(ann.id));

        assert!(store.delete_client(ann.id).await.unwrap());
        assert!(!store.delete_client(ann.id).await.unwrap());
        assert!(store.get_client(ann.id).await.unwrap().is_none());
        assert_eq!(store.client_count(), 0);
    }
}
