pub mod health;
pub mod metrics;
pub mod orchestrate;
pub mod providers;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/api/health", get(health::health))
        .route("/api/metrics", get(metrics::render))
        .route("/api/providers", get(providers::list))
        .route("/api/test-service", post(providers::test_service))
        .route("/api/orchestrate", post(orchestrate::orchestrate))
        .route("/api/sessions", post(sessions::create).get(sessions::list))
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/sessions/:id/history", get(sessions::history))
        .route("/api/sessions/:id/metrics", get(sessions::session_metrics))
        .route("/api/sessions/:id/cancel", post(sessions::cancel))
}
