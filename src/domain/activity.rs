//! Append-only audit trail entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod actions {
    pub const CREATED: &str = "rfp_created";
    pub const CONTENT_UPDATED: &str = "content_updated";
    pub const STATUS_CHANGED: &str = "status_changed";
    pub const RESPONSE_SUBMITTED: &str = "response_submitted";
    pub const DOCUMENT_UPLOADED: &str = "document_uploaded";
    pub const VERSION_UPLOADED: &str = "document_version_uploaded";
    pub const VERSION_REVERTED: &str = "document_version_reverted";
}

/// Activity log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityLog {
    pub id: Uuid,
    pub rfp_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(
        rfp_id: Uuid,
        actor_id: Option<Uuid>,
        action: &str,
        details: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfp_id,
            actor_id,
            action: action.to_string(),
            details,
            created_at: at,
        }
    }
}
