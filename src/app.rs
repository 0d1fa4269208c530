use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::TokenService;
use crate::config::Settings;
use crate::dispatch::{Dispatcher, JobQueue};
use crate::middleware::{request_id_layer, RequestIdSpan};
use crate::routes;
use crate::services::{AccountService, DocumentService, DocumentStore};
use crate::store::RfpStore;
use crate::workflow::WorkflowEngine;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn RfpStore>,
    pub workflow: WorkflowEngine,
    pub documents: DocumentService,
    pub accounts: AccountService,
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Present when jobs go through a broker; checked by `/health`
    pub queue: Option<Arc<dyn JobQueue>>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn RfpStore>,
        dispatcher: Arc<dyn Dispatcher>,
        blobs: Arc<dyn DocumentStore>,
        queue: Option<Arc<dyn JobQueue>>,
    ) -> Arc<Self> {
        let tokens = Arc::new(TokenService::new(
            &settings.jwt_secret,
            settings.access_token_expires_minutes,
            settings.refresh_token_expires_days,
        ));
        let accounts = AccountService::new(store.clone(), tokens)
            .with_hash_cost(settings.password_hash_cost);

        Arc::new(Self {
            workflow: WorkflowEngine::new(store.clone(), dispatcher.clone()),
            documents: DocumentService::new(store.clone(), blobs),
            accounts,
            settings,
            store,
            dispatcher,
            queue,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep INFO output quiet
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(RequestIdSpan)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(crate::middleware::X_REQUEST_ID),
        ]))
        // Refresh cookie travels cross-origin
        .allow_credentials(true)
        .max_age(max_age)
}
