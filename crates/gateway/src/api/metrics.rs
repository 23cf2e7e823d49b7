use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET /api/metrics — OpenMetrics text rendering.
///
/// Render failures are absorbed by the collector, which serves a minimal
/// fallback payload instead of an error status.
pub async fn render(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], body)
}
