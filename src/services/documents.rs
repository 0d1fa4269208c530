//! Document versioning
//!
//! Versions of a document form a gapless sequence starting at 1. A new
//! upload or a revert always appends `max + 1`; existing rows are never
//! rewritten.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::storage::{DocumentStore, StorageError, UploadHandle};
use crate::domain::activity::actions;
use crate::domain::{
    ActivityLog, CompleteUploadRequest, CompleteUploadResponse, DocumentVersion,
    NewVersionRequest, Rfp, RfpDocument, RfpStatus, MAX_FILENAME_LEN,
};
use crate::store::{RfpStore, StoreError};
use crate::workflow::Caller;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("a concurrent upload took this version number, retry")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DocumentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation(_) => Self::Conflict,
            other => Self::Store(other),
        }
    }
}

/// Uploads, versions and previews of RFP documents
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn RfpStore>,
    blobs: Arc<dyn DocumentStore>,
}

impl DocumentService {
    pub fn new(store: Arc<dyn RfpStore>, blobs: Arc<dyn DocumentStore>) -> Self {
        Self { store, blobs }
    }

    pub fn presign(&self, key: &str, content_type: &str) -> Result<UploadHandle, DocumentError> {
        Ok(self.blobs.issue_upload_handle(key, content_type)?)
    }

    /// Write bytes for a key issued by [`presign`](Self::presign).
    pub async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), DocumentError> {
        Ok(self.blobs.put(key, bytes).await?)
    }

    /// Attach an uploaded object to an RFP as a new document at version 1.
    pub async fn complete_upload(
        &self,
        caller: &Caller,
        request: CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse, DocumentError> {
        let filename = request.filename.trim();
        if filename.is_empty() {
            return Err(DocumentError::Validation("filename must not be empty".to_string()));
        }
        if filename.chars().count() > MAX_FILENAME_LEN {
            return Err(DocumentError::Validation(format!(
                "filename must be at most {} characters",
                MAX_FILENAME_LEN
            )));
        }
        let rfp = self.owned_rfp(request.rfp_id, caller).await?;

        let now = Utc::now();
        let document = RfpDocument {
            id: Uuid::new_v4(),
            rfp_id: rfp.id,
            filename: filename.to_string(),
            storage_path: request.key.clone(),
            created_at: now,
        };
        let version = DocumentVersion {
            id: Uuid::new_v4(),
            document_id: document.id,
            version_number: 1,
            storage_key: request.key,
            uploaded_by: Some(caller.id),
            notes: None,
            created_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_document(&document).await?;
        tx.insert_version(&version).await?;
        tx.append_activity(&ActivityLog::new(
            rfp.id,
            Some(caller.id),
            actions::DOCUMENT_UPLOADED,
            Some(document.filename.clone()),
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(rfp_id = %rfp.id, document_id = %document.id, "Document uploaded");
        Ok(CompleteUploadResponse {
            ok: true,
            document_id: document.id,
            version_id: version.id,
            version_number: version.version_number,
        })
    }

    pub async fn upload_new_version(
        &self,
        document_id: Uuid,
        caller: &Caller,
        request: NewVersionRequest,
    ) -> Result<DocumentVersion, DocumentError> {
        let document = self.document(document_id).await?;
        self.owned_rfp(document.rfp_id, caller).await?;
        self.append_version(
            &document,
            caller,
            request.key,
            request.notes,
            actions::VERSION_UPLOADED,
        )
        .await
    }

    /// Append a version that reuses the storage key of version `version_number`.
    pub async fn revert(
        &self,
        document_id: Uuid,
        version_number: i32,
        caller: &Caller,
    ) -> Result<DocumentVersion, DocumentError> {
        let document = self.document(document_id).await?;
        self.owned_rfp(document.rfp_id, caller).await?;
        let target = self
            .store
            .get_version(document_id, version_number)
            .await?
            .ok_or(DocumentError::NotFound("version"))?;

        self.append_version(
            &document,
            caller,
            target.storage_key,
            Some(format!("Reverted to {}", version_number)),
            actions::VERSION_REVERTED,
        )
        .await
    }

    /// Versions newest first
    pub async fn list_versions(
        &self,
        document_id: Uuid,
        caller: &Caller,
    ) -> Result<Vec<DocumentVersion>, DocumentError> {
        let document = self.document(document_id).await?;
        self.readable_rfp(document.rfp_id, caller).await?;
        Ok(self.store.list_versions(document_id).await?)
    }

    pub async fn list_documents(
        &self,
        rfp_id: Uuid,
        caller: &Caller,
    ) -> Result<Vec<RfpDocument>, DocumentError> {
        self.readable_rfp(rfp_id, caller).await?;
        Ok(self.store.list_documents(rfp_id).await?)
    }

    /// Bytes of one version, with its metadata
    pub async fn preview(
        &self,
        document_id: Uuid,
        version_number: i32,
        caller: &Caller,
    ) -> Result<(RfpDocument, Vec<u8>), DocumentError> {
        let document = self.document(document_id).await?;
        self.readable_rfp(document.rfp_id, caller).await?;
        let version = self
            .store
            .get_version(document_id, version_number)
            .await?
            .ok_or(DocumentError::NotFound("version"))?;
        let bytes = self.blobs.materialize_key(&version.storage_key).await?;
        Ok((document, bytes))
    }

    async fn append_version(
        &self,
        document: &RfpDocument,
        caller: &Caller,
        storage_key: String,
        notes: Option<String>,
        action: &str,
    ) -> Result<DocumentVersion, DocumentError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let version = DocumentVersion {
            id: Uuid::new_v4(),
            document_id: document.id,
            version_number: tx.next_version_number(document.id).await?,
            storage_key,
            uploaded_by: Some(caller.id),
            notes,
            created_at: now,
        };
        tx.insert_version(&version).await?;
        tx.append_activity(&ActivityLog::new(
            document.rfp_id,
            Some(caller.id),
            action,
            Some(format!("{} v{}", document.filename, version.version_number)),
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(
            document_id = %document.id,
            version_number = version.version_number,
            "Document version added"
        );
        Ok(version)
    }

    async fn document(&self, id: Uuid) -> Result<RfpDocument, DocumentError> {
        self.store
            .get_document(id)
            .await?
            .ok_or(DocumentError::NotFound("document"))
    }

    async fn owned_rfp(&self, rfp_id: Uuid, caller: &Caller) -> Result<Rfp, DocumentError> {
        let rfp = self
            .store
            .get_rfp(rfp_id)
            .await?
            .ok_or(DocumentError::NotFound("RFP"))?;
        if rfp.owner_id != caller.id {
            return Err(DocumentError::Forbidden(
                "only the RFP owner can manage its documents".to_string(),
            ));
        }
        Ok(rfp)
    }

    async fn readable_rfp(&self, rfp_id: Uuid, caller: &Caller) -> Result<Rfp, DocumentError> {
        let rfp = self
            .store
            .get_rfp(rfp_id)
            .await?
            .ok_or(DocumentError::NotFound("RFP"))?;
        let visible = rfp.owner_id == caller.id
            || (caller.is_supplier() && rfp.status != RfpStatus::Draft);
        if !visible {
            return Err(DocumentError::Forbidden(
                "not allowed to view documents of this RFP".to_string(),
            ));
        }
        Ok(rfp)
    }
}
