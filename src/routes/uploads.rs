//! Upload handles and the local upload target

use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::{Created, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{CompleteUploadRequest, CompleteUploadResponse, LocalPutQuery, PresignRequest};
use crate::error::{ApiError, ApiResult};
use crate::services::UploadHandle;

/// POST /uploads/presign
pub async fn presign(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PresignRequest>,
) -> ApiResult<Json<UploadHandle>> {
    tracing::debug!(user_id = %auth.user_id, key = %req.key, "Issuing upload handle");
    let handle = state.documents.presign(&req.key, &req.content_type)?;
    Ok(Json(handle))
}

/// POST /uploads/complete
pub async fn complete(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteUploadRequest>,
) -> ApiResult<Created<CompleteUploadResponse>> {
    let completed = state.documents.complete_upload(&auth.caller(), req).await?;
    Ok(Created(completed))
}

/// POST /uploads/local/put?key=
///
/// Stores the first multipart field under `key`.
pub async fn local_put(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LocalPutQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<MessageResponse>> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        .ok_or_else(|| ApiError::bad_request("Multipart body has no file field"))?;
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

    state.documents.put_object(&query.key, &bytes).await?;
    tracing::info!(
        user_id = %auth.user_id,
        key = %query.key,
        size = bytes.len(),
        "Object stored"
    );
    Ok(Json(MessageResponse::with_code("Upload stored", "UPLOAD_STORED")))
}
