use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RfpStatus;

/// Supplier response to an RFP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplierResponse {
    pub id: Uuid,
    pub rfp_id: Uuid,
    pub supplier_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for responding to an RFP
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponseRequest {
    #[serde(default)]
    pub content: Option<String>,
}

/// Acknowledgement returned after a response is stored
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponseAck {
    pub ok: bool,
    pub response_id: Uuid,
}

/// A supplier's own response joined with the RFP it answers
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SupplierResponseView {
    pub id: Uuid,
    pub rfp_id: Uuid,
    pub rfp_title: String,
    pub rfp_status: RfpStatus,
    pub owner_email: String,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    pub rfp_created_at: DateTime<Utc>,
}

/// Wrapper for the supplier responses endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SupplierResponsesEnvelope {
    pub responses: Vec<SupplierResponseView>,
}
