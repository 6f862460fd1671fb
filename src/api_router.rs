//! Combines the API routes from all domain modules into a unified router.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::events::configure())
        .merge(crate::registrations::configure())
        .merge(crate::livestream::configure())
        .merge(crate::pastevents::configure())
        .merge(crate::donations::configure())
        .merge(crate::volunteers::configure())
        .merge(crate::contact::configure())
        .merge(crate::webhooks::configure())
        .merge(crate::admin::configure())
        .route("/api/health", get(handle_health))
}

async fn handle_health(
    State(_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(
        serde_json::json!({"status": "healthy", "timestamp": chrono::Utc::now().to_rfc3339()}),
    ))
}
