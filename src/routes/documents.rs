use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::Created;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{NewVersionRequest, RfpDocument, VersionCreatedResponse, VersionSummary};
use crate::error::ApiResult;

/// GET /rfps/:rfp_id/documents
pub async fn list_documents(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RfpDocument>>> {
    let documents = state.documents.list_documents(rfp_id, &auth.caller()).await?;
    Ok(Json(documents))
}

/// GET /documents/:document_id/versions
pub async fn list_versions(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<Vec<VersionSummary>>> {
    let versions = state
        .documents
        .list_versions(document_id, &auth.caller())
        .await?;
    Ok(Json(versions.into_iter().map(Into::into).collect()))
}

/// POST /documents/:document_id/versions
pub async fn upload_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
    Json(req): Json<NewVersionRequest>,
) -> ApiResult<Created<VersionCreatedResponse>> {
    let version = state
        .documents
        .upload_new_version(document_id, &auth.caller(), req)
        .await?;
    Ok(Created(version.into()))
}

/// POST /documents/:document_id/versions/:version_number/revert
pub async fn revert_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((document_id, version_number)): Path<(Uuid, i32)>,
) -> ApiResult<Created<VersionCreatedResponse>> {
    let version = state
        .documents
        .revert(document_id, version_number, &auth.caller())
        .await?;
    Ok(Created(version.into()))
}

/// GET /documents/:document_id/versions/:version_number/preview
///
/// Raw bytes of the version, typed from the document's filename.
pub async fn preview_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((document_id, version_number)): Path<(Uuid, i32)>,
) -> ApiResult<Response> {
    let (document, bytes) = state
        .documents
        .preview(document_id, version_number, &auth.caller())
        .await?;

    let disposition = format!(
        "inline; filename=\"{}\"",
        document.filename.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&document.filename).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}
