//! RFP repository
//!
//! Durable storage for users, RFPs, documents, versions, responses and the
//! activity log. Reads go straight through [`RfpStore`]; every multi-row
//! mutation runs inside an [`RfpTransaction`] whose boundary is owned by the
//! caller (the workflow engine or document service), never by the store.
//!
//! | Backend | Type | Selected by |
//! |---------|------|-------------|
//! | PostgreSQL | [`PgStore`] | `STORAGE_BACKEND=postgres` |
//! | In-memory | [`MemoryStore`] | `STORAGE_BACKEND=memory`, tests |

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ActivityLog, DocumentVersion, Rfp, RfpContent, RfpDocument, RfpStatus, SupplierResponse,
    SupplierResponseView, User,
};
use crate::services::search::SearchQuery;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Predicate for RFP listings
#[derive(Debug, Clone, Default)]
pub struct RfpFilter {
    pub owner_id: Option<Uuid>,
    pub status: Option<RfpStatus>,
    /// Case-insensitive substring match on the title
    pub title_contains: Option<String>,
}

impl RfpFilter {
    pub fn matches(&self, rfp: &Rfp) -> bool {
        if self.owner_id.is_some_and(|owner| owner != rfp.owner_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != rfp.status) {
            return false;
        }
        match &self.title_contains {
            Some(needle) => rfp.title.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

/// Repository handle shared by the engine, services and dispatcher
#[async_trait]
pub trait RfpStore: Send + Sync {
    /// Open a unit of work. Dropping it without [`RfpTransaction::commit`] rolls back.
    async fn begin(&self) -> Result<Box<dyn RfpTransaction>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    // Users
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    // RFPs
    async fn get_rfp(&self, id: Uuid) -> Result<Option<Rfp>, StoreError>;
    async fn find_rfps(
        &self,
        filter: &RfpFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rfp>, i64), StoreError>;
    /// Delete an RFP and everything it owns. Returns false when absent.
    async fn delete_rfp(&self, id: Uuid) -> Result<bool, StoreError>;

    // Responses and activity
    async fn list_responses(&self, rfp_id: Uuid) -> Result<Vec<SupplierResponse>, StoreError>;
    async fn list_supplier_responses(
        &self,
        supplier_id: Uuid,
    ) -> Result<Vec<SupplierResponseView>, StoreError>;
    /// Distinct emails of suppliers that responded to an RFP
    async fn responding_supplier_emails(&self, rfp_id: Uuid) -> Result<Vec<String>, StoreError>;
    async fn list_activity(&self, rfp_id: Uuid) -> Result<Vec<ActivityLog>, StoreError>;

    // Documents
    async fn get_document(&self, id: Uuid) -> Result<Option<RfpDocument>, StoreError>;
    async fn list_documents(&self, rfp_id: Uuid) -> Result<Vec<RfpDocument>, StoreError>;
    /// Versions newest first
    async fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>, StoreError>;
    async fn get_version(
        &self,
        document_id: Uuid,
        version_number: i32,
    ) -> Result<Option<DocumentVersion>, StoreError>;

    // Search projection
    /// Recompute the projection from the current row. Returns false when the RFP is gone.
    async fn refresh_search_projection(&self, rfp_id: Uuid) -> Result<bool, StoreError>;
    async fn search_projection(&self, rfp_id: Uuid) -> Result<Option<String>, StoreError>;
    async fn search_rfps(&self, query: &SearchQuery) -> Result<(Vec<Rfp>, i64), StoreError>;
}

/// Unit of work over the repository
#[async_trait]
pub trait RfpTransaction: Send {
    /// Insert or update an RFP row. The owner of an existing row is never changed.
    async fn save_rfp(&mut self, rfp: &Rfp) -> Result<(), StoreError>;

    /// Set `status = next` only if the stored status is still `expected`.
    /// Returns the updated row, or `None` when the precondition no longer holds.
    async fn compare_and_set_status(
        &mut self,
        id: Uuid,
        expected: RfpStatus,
        next: RfpStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Rfp>, StoreError>;

    /// Replace the content fields if the status is still `expected`.
    async fn update_content(
        &mut self,
        id: Uuid,
        expected: RfpStatus,
        content: &RfpContent,
        at: DateTime<Utc>,
    ) -> Result<Option<Rfp>, StoreError>;

    async fn insert_response(&mut self, response: &SupplierResponse) -> Result<(), StoreError>;
    async fn append_activity(&mut self, entry: &ActivityLog) -> Result<(), StoreError>;

    async fn insert_document(&mut self, document: &RfpDocument) -> Result<(), StoreError>;
    /// `max(version_number) + 1` for the document, starting at 1
    async fn next_version_number(&mut self, document_id: Uuid) -> Result<i32, StoreError>;
    async fn insert_version(&mut self, version: &DocumentVersion) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
