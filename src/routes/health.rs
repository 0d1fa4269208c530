use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let queue_check = async {
        match &state.queue {
            Some(queue) => Some(queue.health_check().await),
            None => None,
        }
    };
    let (db_result, queue_result) = tokio::join!(state.store.health_check(), queue_check);

    if let Err(e) = &db_result {
        tracing::error!(error = %e, "Repository health check failed");
    }
    if let Some(Err(e)) = &queue_result {
        tracing::warn!(error = %e, "Queue health check failed");
    }

    let db_ok = db_result.is_ok();
    let queue_ok = queue_result.as_ref().map_or(true, |r| r.is_ok());

    // Dispatch falls back to local execution, so the queue only degrades
    let status = match (db_ok, queue_ok) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    let status_code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let label = |ok: bool| if ok { "ok" } else { "error" }.to_string();

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: label(db_ok),
                queue: queue_result.map(|r| label(r.is_ok())),
            },
        }),
    )
}
