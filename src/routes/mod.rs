pub mod auth;
pub mod documents;
pub mod health;
pub mod rfps;
pub mod uploads;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        // RFPs
        .route("/rfps", post(rfps::create_rfp).get(rfps::list_rfps))
        .route("/rfps/search", get(rfps::search_rfps))
        .route("/rfps/supplier/responses", get(rfps::supplier_responses))
        .route("/rfps/supplier/published", get(rfps::published_rfps))
        .route(
            "/rfps/:rfp_id",
            get(rfps::get_rfp)
                .put(rfps::update_rfp)
                .delete(rfps::delete_rfp),
        )
        .route("/rfps/:rfp_id/status", patch(rfps::change_status))
        .route("/rfps/:rfp_id/respond", post(rfps::submit_response))
        .route("/rfps/:rfp_id/responses", get(rfps::list_responses))
        .route("/rfps/:rfp_id/activity", get(rfps::list_activity))
        .route("/rfps/:rfp_id/documents", get(documents::list_documents))
        // Uploads
        .route("/uploads/presign", post(uploads::presign))
        .route("/uploads/complete", post(uploads::complete))
        .route("/uploads/local/put", post(uploads::local_put))
        // Document versions
        .route(
            "/documents/:document_id/versions",
            get(documents::list_versions).post(documents::upload_version),
        )
        .route(
            "/documents/:document_id/versions/:version_number/revert",
            post(documents::revert_version),
        )
        .route(
            "/documents/:document_id/versions/:version_number/preview",
            get(documents::preview_version),
        )
}
