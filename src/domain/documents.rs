use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest filename the `documents.filename` column holds, in characters
pub const MAX_FILENAME_LEN: usize = 255;

/// Document attached to an RFP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RfpDocument {
    pub id: Uuid,
    pub rfp_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable version of a document.
///
/// `(document_id, version_number)` is unique and version numbers are never
/// reused; a revert appends a new row pointing at an older storage key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version_number: i32,
    pub storage_key: String,
    pub uploaded_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for an upload handle
#[derive(Debug, Clone, Deserialize)]
pub struct PresignRequest {
    pub key: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// Request DTO for completing an upload
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteUploadRequest {
    pub rfp_id: Uuid,
    pub key: String,
    pub filename: String,
}

/// Request DTO for uploading a new version of an existing document
#[derive(Debug, Clone, Deserialize)]
pub struct NewVersionRequest {
    pub key: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query params for the local upload endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LocalPutQuery {
    pub key: String,
}

/// Response DTO after completing an upload
#[derive(Debug, Clone, Serialize)]
pub struct CompleteUploadResponse {
    pub ok: bool,
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub version_number: i32,
}

/// Response DTO for a created version
#[derive(Debug, Clone, Serialize)]
pub struct VersionCreatedResponse {
    pub id: Uuid,
    pub version_number: i32,
}

impl From<DocumentVersion> for VersionCreatedResponse {
    fn from(v: DocumentVersion) -> Self {
        Self {
            id: v.id,
            version_number: v.version_number,
        }
    }
}

/// Version listing entry
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    pub id: Uuid,
    pub version_number: i32,
    pub storage_key: String,
    pub uploaded_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentVersion> for VersionSummary {
    fn from(v: DocumentVersion) -> Self {
        Self {
            id: v.id,
            version_number: v.version_number,
            storage_key: v.storage_key,
            uploaded_by: v.uploaded_by,
            notes: v.notes,
            created_at: v.created_at,
        }
    }
}
