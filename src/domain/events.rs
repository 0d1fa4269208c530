//! Domain events emitted by the workflow engine after a commit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RfpStatus;

/// Who caused a transition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(Uuid),
    /// Implicit transitions, e.g. the first supplier response
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(*id),
            Self::System => None,
        }
    }
}

/// A committed status transition, with the title and owner contact as they
/// were at commit time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChanged {
    pub rfp_id: Uuid,
    pub from: RfpStatus,
    pub to: RfpStatus,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    pub title: String,
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    RfpCreated { rfp_id: Uuid, owner_id: Uuid },
    RfpContentUpdated { rfp_id: Uuid, actor_id: Uuid },
    StatusChanged(StatusChanged),
}

impl DomainEvent {
    pub fn rfp_id(&self) -> Uuid {
        match self {
            Self::RfpCreated { rfp_id, .. } | Self::RfpContentUpdated { rfp_id, .. } => *rfp_id,
            Self::StatusChanged(change) => change.rfp_id,
        }
    }
}
