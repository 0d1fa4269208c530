use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest title the `rfps.title` column holds, in characters
pub const MAX_TITLE_LEN: usize = 255;

/// RFP lifecycle status.
///
/// The wire vocabulary is the upper-case form (`DRAFT`, `PUBLISHED`, ...) and
/// is matched case-sensitively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RfpStatus {
    Draft,
    Published,
    ResponseSubmitted,
    UnderReview,
    Approved,
    Rejected,
}

impl Default for RfpStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl RfpStatus {
    pub const ALL: [RfpStatus; 6] = [
        Self::Draft,
        Self::Published,
        Self::ResponseSubmitted,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::ResponseSubmitted => "RESPONSE_SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Content fields may only change while the RFP is still open.
    pub fn is_content_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Published)
    }
}

impl fmt::Display for RfpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown RFP status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for RfpStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// RFP entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rfp {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub status: RfpStatus,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable text content of an RFP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RfpContent {
    pub title: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
}

impl Rfp {
    pub fn content(&self) -> RfpContent {
        RfpContent {
            title: self.title.clone(),
            description: self.description.clone(),
            requirements: self.requirements.clone(),
        }
    }
}

/// Request DTO for creating an RFP
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRfpRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

/// Request DTO for updating RFP content
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRfpRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

impl UpdateRfpRequest {
    /// Overlay the provided fields on top of the current content.
    pub fn apply_to(&self, current: &RfpContent) -> RfpContent {
        RfpContent {
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            description: self
                .description
                .clone()
                .or_else(|| current.description.clone()),
            requirements: self
                .requirements
                .clone()
                .or_else(|| current.requirements.clone()),
        }
    }
}

/// Query params for the status endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeQuery {
    pub new_status: String,
}

/// Owner reference embedded in supplier-facing listings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OwnerRef {
    pub id: Uuid,
    pub email: String,
}

/// Published RFP with owner info, as shown to suppliers
#[derive(Debug, Clone, Serialize)]
pub struct PublishedRfpView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub status: RfpStatus,
    pub created_at: DateTime<Utc>,
    pub owner: OwnerRef,
}
