//! In-memory repository backend.
//!
//! A transaction takes the state lock, works on a private copy and swaps it
//! in on commit, so concurrent units of work are serialized and a dropped
//! transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{RfpFilter, RfpStore, RfpTransaction, StoreError};
use crate::domain::{
    ActivityLog, DocumentVersion, Rfp, RfpContent, RfpDocument, RfpStatus, SupplierResponse,
    SupplierResponseView, User,
};
use crate::services::search::{self, SearchQuery};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    rfps: HashMap<Uuid, Rfp>,
    projections: HashMap<Uuid, String>,
    responses: Vec<SupplierResponse>,
    activity: Vec<ActivityLog>,
    documents: HashMap<Uuid, RfpDocument>,
    versions: Vec<DocumentVersion>,
}

impl MemoryState {
    fn sorted_rfps<'a>(&'a self, filter: impl Fn(&Rfp) -> bool) -> Vec<&'a Rfp> {
        let mut items: Vec<&Rfp> = self.rfps.values().filter(|r| filter(r)).collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        items
    }

    fn remove_rfp(&mut self, id: Uuid) -> bool {
        if self.rfps.remove(&id).is_none() {
            return false;
        }
        self.projections.remove(&id);
        self.responses.retain(|r| r.rfp_id != id);
        self.activity.retain(|a| a.rfp_id != id);
        let doc_ids: Vec<Uuid> = self
            .documents
            .values()
            .filter(|d| d.rfp_id == id)
            .map(|d| d.id)
            .collect();
        for doc_id in &doc_ids {
            self.documents.remove(doc_id);
        }
        self.versions.retain(|v| !doc_ids.contains(&v.document_id));
        true
    }
}

fn page<T: Clone>(items: Vec<&T>, limit: i64, offset: i64) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let page = items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect();
    (page, total)
}

/// Repository kept entirely in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RfpStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn RfpTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let email = user.email.to_lowercase();
        if state
            .users
            .values()
            .any(|u| u.email.to_lowercase() == email)
        {
            return Err(StoreError::UniqueViolation("users.email".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_lowercase();
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn get_rfp(&self, id: Uuid) -> Result<Option<Rfp>, StoreError> {
        Ok(self.state.lock().await.rfps.get(&id).cloned())
    }

    async fn find_rfps(
        &self,
        filter: &RfpFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rfp>, i64), StoreError> {
        let state = self.state.lock().await;
        Ok(page(state.sorted_rfps(|r| filter.matches(r)), limit, offset))
    }

    async fn delete_rfp(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.remove_rfp(id))
    }

    async fn list_responses(&self, rfp_id: Uuid) -> Result<Vec<SupplierResponse>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<SupplierResponse> = state
            .responses
            .iter()
            .filter(|r| r.rfp_id == rfp_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn list_supplier_responses(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<SupplierResponseView>, StoreError> {
        let state = self.state.lock().await;
        let mut items = Vec::new();
        for response in state.responses.iter().filter(|r| r.supplier_id == supplier_id) {
            let Some(rfp) = state.rfps.get(&response.rfp_id) else {
                continue;
            };
            let owner_email = state
                .users
                .get(&rfp.owner_id)
                .map(|u| u.email.clone())
                .unwrap_or_default();
            items.push(SupplierResponseView {
                id: response.id,
                rfp_id: rfp.id,
                rfp_title: rfp.title.clone(),
                rfp_status: rfp.status,
                owner_email,
                content: response.content.clone(),
                submitted_at: response.created_at,
                rfp_created_at: rfp.created_at,
            });
        }
        items.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(items)
    }

    async fn responding_supplier_emails(&self, rfp_id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let emails: BTreeSet<String> = state
            .responses
            .iter()
            .filter(|r| r.rfp_id == rfp_id)
            .filter_map(|r| state.users.get(&r.supplier_id))
            .map(|u| u.email.clone())
            .collect();
        Ok(emails.into_iter().collect())
    }

    async fn list_activity(&self, rfp_id: Uuid) -> Result<Vec<ActivityLog>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .activity
            .iter()
            .filter(|a| a.rfp_id == rfp_id)
            .cloned()
            .collect())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<RfpDocument>, StoreError> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn list_documents(&self, rfp_id: Uuid) -> Result<Vec<RfpDocument>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<RfpDocument> = state
            .documents
            .values()
            .filter(|d| d.rfp_id == rfp_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    async fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<DocumentVersion> = state
            .versions
            .iter()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(items)
    }

    async fn get_version(
        &self,
        document_id: Uuid,
        version_number: i32,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .versions
            .iter()
            .find(|v| v.document_id == document_id && v.version_number == version_number)
            .cloned())
    }

    async fn refresh_search_projection(&self, rfp_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(rfp) = state.rfps.get(&rfp_id) else {
            return Ok(false);
        };
        let projection = search::project(&rfp.content());
        state.projections.insert(rfp_id, projection);
        Ok(true)
    }

    async fn search_projection(&self, rfp_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().await.projections.get(&rfp_id).cloned())
    }

    async fn search_rfps(&self, query: &SearchQuery) -> Result<(Vec<Rfp>, i64), StoreError> {
        let state = self.state.lock().await;
        let filter = RfpFilter {
            owner_id: query.owner_id,
            status: query.status,
            title_contains: None,
        };
        let hits = state.sorted_rfps(|r| {
            filter.matches(r)
                && state
                    .projections
                    .get(&r.id)
                    .is_some_and(|p| search::matches(p, &query.text))
        });
        Ok(page(hits, query.limit, query.offset))
    }
}

/// Unit of work over a private copy of the state
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl RfpTransaction for MemoryTransaction {
    async fn save_rfp(&mut self, rfp: &Rfp) -> Result<(), StoreError> {
        let mut row = rfp.clone();
        if let Some(existing) = self.working.rfps.get(&rfp.id) {
            row.owner_id = existing.owner_id;
            row.created_at = existing.created_at;
        }
        self.working.rfps.insert(row.id, row);
        Ok(())
    }

    async fn compare_and_set_status(
        &mut self,
        id: Uuid,
        expected: RfpStatus,
        next: RfpStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Rfp>, StoreError> {
        match self.working.rfps.get_mut(&id) {
            Some(rfp) if rfp.status == expected => {
                rfp.status = next;
                rfp.updated_at = at;
                Ok(Some(rfp.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_content(
        &mut self,
        id: Uuid,
        expected: RfpStatus,
        content: &RfpContent,
        at: DateTime<Utc>,
    ) -> Result<Option<Rfp>, StoreError> {
        match self.working.rfps.get_mut(&id) {
            Some(rfp) if rfp.status == expected => {
                rfp.title = content.title.clone();
                rfp.description = content.description.clone();
                rfp.requirements = content.requirements.clone();
                rfp.updated_at = at;
                Ok(Some(rfp.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_response(&mut self, response: &SupplierResponse) -> Result<(), StoreError> {
        self.working.responses.push(response.clone());
        Ok(())
    }

    async fn append_activity(&mut self, entry: &ActivityLog) -> Result<(), StoreError> {
        self.working.activity.push(entry.clone());
        Ok(())
    }

    async fn insert_document(&mut self, document: &RfpDocument) -> Result<(), StoreError> {
        self.working.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn next_version_number(&mut self, document_id: Uuid) -> Result<i32, StoreError> {
        let latest = self
            .working
            .versions
            .iter()
            .filter(|v| v.document_id == document_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0);
        Ok(latest + 1)
    }

    async fn insert_version(&mut self, version: &DocumentVersion) -> Result<(), StoreError> {
        let taken = self.working.versions.iter().any(|v| {
            v.document_id == version.document_id && v.version_number == version.version_number
        });
        if taken {
            return Err(StoreError::UniqueViolation(
                "rfp_document_versions.(rfp_document_id, version_number)".to_string(),
            ));
        }
        self.working.versions.push(version.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RfpStatus;

    fn rfp(owner_id: Uuid, title: &str) -> Rfp {
        let now = Utc::now();
        Rfp {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            requirements: None,
            status: RfpStatus::Draft,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let row = rfp(Uuid::new_v4(), "Rollback");

        {
            let mut tx = store.begin().await.unwrap();
            tx.save_rfp(&row).await.unwrap();
        }

        assert!(store.get_rfp(row.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn title_filter_treats_wildcards_literally() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        tx.save_rfp(&rfp(owner, "Desks 50% off")).await.unwrap();
        tx.save_rfp(&rfp(owner, "Chairs")).await.unwrap();
        tx.commit().await.unwrap();

        let filter = |q: &str| RfpFilter {
            title_contains: Some(q.to_string()),
            ..Default::default()
        };
        let (hits, total) = store.find_rfps(&filter("%"), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].title, "Desks 50% off");
        let (_, total) = store.find_rfps(&filter("ch_irs"), 10, 0).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let row = rfp(Uuid::new_v4(), "CAS");
        let mut tx = store.begin().await.unwrap();
        tx.save_rfp(&row).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let stale = tx
            .compare_and_set_status(row.id, RfpStatus::Published, RfpStatus::UnderReview, Utc::now())
            .await
            .unwrap();
        assert!(stale.is_none());
        let fresh = tx
            .compare_and_set_status(row.id, RfpStatus::Draft, RfpStatus::Published, Utc::now())
            .await
            .unwrap();
        assert_eq!(fresh.map(|r| r.status), Some(RfpStatus::Published));
        tx.commit().await.unwrap();

        let stored = store.get_rfp(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RfpStatus::Published);
    }

    #[tokio::test]
    async fn delete_cascades_to_owned_rows() {
        let store = MemoryStore::new();
        let row = rfp(Uuid::new_v4(), "Cascade");
        let doc = RfpDocument {
            id: Uuid::new_v4(),
            rfp_id: row.id,
            filename: "scope.pdf".into(),
            storage_path: "rfps/scope.pdf".into(),
            created_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        tx.save_rfp(&row).await.unwrap();
        tx.insert_document(&doc).await.unwrap();
        tx.append_activity(&ActivityLog::new(row.id, None, "test", None, Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(store.delete_rfp(row.id).await.unwrap());
        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert!(store.list_activity(row.id).await.unwrap().is_empty());
        assert!(!store.delete_rfp(row.id).await.unwrap());
    }
}
