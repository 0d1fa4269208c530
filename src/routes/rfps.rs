use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{
    ActivityLog, CreateRfpRequest, PublishedRfpView, Rfp, RfpStatus, StatusChangeQuery,
    SubmitResponseAck, SubmitResponseRequest, SupplierResponse, SupplierResponsesEnvelope,
    UpdateRfpRequest,
};
use crate::error::ApiResult;
use crate::workflow::WorkflowError;

#[derive(Debug, Deserialize)]
pub struct ListFilter {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub q: String,
}

/// POST /rfps
pub async fn create_rfp(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRfpRequest>,
) -> ApiResult<Created<Rfp>> {
    let rfp = state.workflow.create(&auth.caller(), req).await?;
    Ok(Created(rfp))
}

/// GET /rfps
pub async fn list_rfps(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ListFilter>,
) -> ApiResult<Paginated<Rfp>> {
    let (items, total) = state
        .workflow
        .list(
            &auth.caller(),
            filter.q,
            pagination.limit(),
            pagination.offset(),
        )
        .await?;
    Ok(Paginated::new(items, &pagination, total))
}

/// GET /rfps/search
pub async fn search_rfps(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<SearchFilter>,
) -> ApiResult<Paginated<Rfp>> {
    let (items, total) = state
        .workflow
        .search(
            &auth.caller(),
            &filter.q,
            pagination.limit(),
            pagination.offset(),
        )
        .await?;
    Ok(Paginated::new(items, &pagination, total))
}

/// GET /rfps/:rfp_id
pub async fn get_rfp(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
) -> ApiResult<Json<Rfp>> {
    Ok(Json(state.workflow.get(rfp_id, &auth.caller()).await?))
}

/// PUT /rfps/:rfp_id
pub async fn update_rfp(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
    Json(req): Json<UpdateRfpRequest>,
) -> ApiResult<Json<Rfp>> {
    let rfp = state
        .workflow
        .update_content(rfp_id, &auth.caller(), req)
        .await?;
    Ok(Json(rfp))
}

/// DELETE /rfps/:rfp_id
pub async fn delete_rfp(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
) -> ApiResult<NoContent> {
    state.workflow.delete(rfp_id, &auth.caller()).await?;
    Ok(NoContent)
}

/// PATCH /rfps/:rfp_id/status?new_status=STATUS
pub async fn change_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
    Query(query): Query<StatusChangeQuery>,
) -> ApiResult<Json<Rfp>> {
    let target: RfpStatus = query
        .new_status
        .parse()
        .map_err(WorkflowError::from)?;
    tracing::debug!(
        user_id = %auth.user_id,
        rfp_id = %rfp_id,
        to = %target,
        "Status change requested"
    );
    let rfp = state
        .workflow
        .request_transition(rfp_id, &auth.caller(), target)
        .await?;
    Ok(Json(rfp))
}

/// POST /rfps/:rfp_id/respond
pub async fn submit_response(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
    body: Option<Json<SubmitResponseRequest>>,
) -> ApiResult<Created<SubmitResponseAck>> {
    let content = body.and_then(|Json(b)| b.content);
    let response = state
        .workflow
        .submit_response(rfp_id, &auth.caller(), content)
        .await?;
    Ok(Created(SubmitResponseAck {
        ok: true,
        response_id: response.id,
    }))
}

/// GET /rfps/:rfp_id/responses
pub async fn list_responses(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SupplierResponse>>> {
    let responses = state
        .workflow
        .list_responses(rfp_id, &auth.caller())
        .await?;
    Ok(Json(responses))
}

/// GET /rfps/:rfp_id/activity
pub async fn list_activity(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(rfp_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ActivityLog>>> {
    let entries = state
        .workflow
        .list_activity(rfp_id, &auth.caller())
        .await?;
    Ok(Json(entries))
}

/// GET /rfps/supplier/responses
pub async fn supplier_responses(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SupplierResponsesEnvelope>> {
    let responses = state.workflow.supplier_responses(&auth.caller()).await?;
    Ok(Json(SupplierResponsesEnvelope { responses }))
}

/// GET /rfps/supplier/published
pub async fn published_rfps(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Paginated<PublishedRfpView>> {
    let (items, total) = state
        .workflow
        .published_with_owners(&auth.caller(), pagination.limit(), pagination.offset())
        .await?;
    Ok(Paginated::new(items, &pagination, total))
}
