//! Duplicate and validity filter
//!
//! Decides for each normalized row whether it may be written. Holds the
//! per-run state: the known branches and the phone+branch keys already
//! accepted from the same file.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::services::normalizer::SkipReason;
use crate::services::store::{Store, StoreError};
use crate::types::ClientDraft;

#[derive(Debug)]
pub enum FilterDecision {
    Accept(ClientDraft),
    Skip(SkipReason),
}

pub struct RowFilter {
    store: Arc<dyn Store>,
    branches: HashSet<String>,
    seen: HashSet<(String, String)>,
}

impl RowFilter {
    /// Load the branch list once for the whole run
    pub async fn load(store: Arc<dyn Store>) -> Result<Self, StoreError> {
        let branches = store
            .list_branches()
            .await?
            .into_iter()
            .map(|b| b.name.trim().to_string())
            .collect();
        Ok(Self {
            store,
            branches,
            seen: HashSet::new(),
        })
    }

    /// Check one draft. Only a catastrophic store failure is an error.
    pub async fn check(&mut self, draft: ClientDraft) -> Result<FilterDecision, StoreError> {
        let branch = draft.branch.trim();
        if !self.branches.contains(branch) {
            return Ok(FilterDecision::Skip(SkipReason::BranchNotFound(
                branch.to_string(),
            )));
        }

        let key = draft.dedupe_key();
        let phone = draft.phone_number.trim().to_string();
        if self.seen.contains(&key) {
            return Ok(FilterDecision::Skip(SkipReason::DuplicateInFile { phone }));
        }

        match self.store.find_client_by_phone(&phone, Some(branch), None).await {
            Ok(Some(_)) => return Ok(FilterDecision::Skip(SkipReason::AlreadyExists { phone })),
            Ok(None) => {}
            Err(e) if e.is_catastrophic() => return Err(e),
            // The unique constraint still guards the write
            Err(e) => warn!("Duplicate lookup for {} failed, treating as new: {}", phone, e),
        }

        self.seen.insert(key);
        Ok(FilterDecision::Accept(draft))
    }
}
