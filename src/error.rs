//! Unified API error handling
//!
//! Every handler returns [`ApiResult`]. Layer errors (workflow, documents,
//! accounts, repository) convert into [`ApiError`], which decides the status
//! code and hides internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::accounts::AccountError;
use crate::services::documents::DocumentError;
use crate::services::storage::StorageError;
use crate::store::StoreError;
use crate::workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(#[from] StoreError),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::InvalidTransition(_) | Self::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::InvalidTransition(msg)
            | Self::InvalidState(msg)
            | Self::Conflict(msg) => msg.clone(),
            // Don't leak internal error details
            Self::Internal(_) | Self::Database(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "Database error");
            }
            _ => {
                tracing::warn!(error = %self, "API error");
            }
        }

        let status = self.status_code();
        let body = ErrorResponse {
            code: self.error_code().to_string(),
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Validation(msg) => Self::Validation(msg),
            WorkflowError::NotFound(what) => Self::NotFound(format!("{} not found", what)),
            WorkflowError::Forbidden(msg) => Self::Forbidden(msg),
            WorkflowError::InvalidState(msg) => Self::InvalidState(msg),
            e @ WorkflowError::InvalidTransition { .. } => Self::InvalidTransition(e.to_string()),
            WorkflowError::Conflict(msg) => Self::Conflict(msg),
            WorkflowError::Store(e) => Self::Database(e),
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Validation(msg) => Self::Validation(msg),
            DocumentError::NotFound(what) => Self::NotFound(format!("{} not found", what)),
            DocumentError::Forbidden(msg) => Self::Forbidden(msg),
            e @ DocumentError::Conflict => Self::Conflict(e.to_string()),
            DocumentError::Storage(StorageError::InvalidKey(key)) => {
                Self::Validation(format!("invalid storage key '{}'", key))
            }
            DocumentError::Storage(StorageError::NotFound(key)) => {
                Self::NotFound(format!("object '{}' not found", key))
            }
            DocumentError::Storage(e) => Self::Internal(e.into()),
            DocumentError::Store(e) => Self::Database(e),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Validation(msg) => Self::Validation(msg),
            e @ AccountError::EmailTaken => Self::Conflict(e.to_string()),
            e @ AccountError::InvalidCredentials => Self::Unauthorized(e.to_string()),
            AccountError::Unauthorized(msg) => Self::Unauthorized(msg),
            AccountError::Token(_) => Self::Unauthorized("Invalid or expired token".to_string()),
            AccountError::Store(e) => Self::Database(e),
            e @ (AccountError::Hash(_) | AccountError::Join(_)) => Self::Internal(e.into()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RfpStatus;

    #[test]
    fn workflow_errors_map_to_status_codes() {
        let cases = [
            (WorkflowError::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (
                WorkflowError::InvalidTransition {
                    from: RfpStatus::Approved,
                    to: RfpStatus::Published,
                },
                StatusCode::BAD_REQUEST,
                "INVALID_TRANSITION",
            ),
            (WorkflowError::InvalidState("x".into()), StatusCode::BAD_REQUEST, "INVALID_STATE"),
            (WorkflowError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (WorkflowError::NotFound("RFP"), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (WorkflowError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.error_code(), code);
        }
    }

    #[test]
    fn internal_detail_is_hidden() {
        let api = ApiError::internal("connection refused on 10.0.0.3");
        assert_eq!(api.public_message(), "An internal error occurred");
    }
}
