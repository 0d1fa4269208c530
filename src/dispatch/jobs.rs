use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DomainEvent, RfpStatus};

/// Unit of side-effect work. Serialized as JSON when it goes through a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Recompute the search projection from the current row
    IndexRfp { rfp_id: Uuid },
    /// Email the parties of a status change. Title and owner address are
    /// captured at commit so the email survives a later delete.
    NotifyStatusChange {
        rfp_id: Uuid,
        from: RfpStatus,
        to: RfpStatus,
        title: String,
        #[serde(default)]
        owner_email: Option<String>,
    },
}

impl Job {
    pub fn for_event(event: &DomainEvent) -> Vec<Job> {
        match event {
            DomainEvent::RfpCreated { rfp_id, .. } | DomainEvent::RfpContentUpdated { rfp_id, .. } => {
                vec![Job::IndexRfp { rfp_id: *rfp_id }]
            }
            DomainEvent::StatusChanged(change) => vec![Job::NotifyStatusChange {
                rfp_id: change.rfp_id,
                from: change.from,
                to: change.to,
                title: change.title.clone(),
                owner_email: change.owner_email.clone(),
            }],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::IndexRfp { .. } => "index_rfp",
            Self::NotifyStatusChange { .. } => "notify_status_change",
        }
    }

    pub fn rfp_id(&self) -> Uuid {
        match self {
            Self::IndexRfp { rfp_id } | Self::NotifyStatusChange { rfp_id, .. } => *rfp_id,
        }
    }
}
