use axum::extract::State;
use axum::response::{IntoResponse, Json};
use chrono::Utc;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET / — service banner with the endpoint map.
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "agent-orchestra",
        "version": VERSION,
        "status": "running",
        "endpoints": {
            "health": "/api/health",
            "metrics": "/api/metrics",
            "providers": "/api/providers",
            "orchestrate": "/api/orchestrate",
            "sessions": "/api/sessions",
        },
    }))
}

/// GET /api/health — aggregated health across constructed adapters and
/// the core stores.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut providers = Vec::new();
    let mut all_ok = true;

    // Only probe adapters that were actually constructed; unconfigured
    // providers are not a health failure.
    for adapter in state.factory.cached() {
        let status = adapter.health().await;
        all_ok &= status.ok;
        providers.push(serde_json::json!({
            "provider": adapter.provider_tag().as_str(),
            "model": adapter.model_name(),
            "health": status,
        }));
    }

    Json(serde_json::json!({
        "status": if all_ok { "healthy" } else { "degraded" },
        "version": VERSION,
        "timestamp": Utc::now(),
        "active_sessions": state.metrics.active_sessions(),
        "session_count": state.sessions.len(),
        "tools": state.tools.names(),
        "providers": providers,
    }))
}
