use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use ao_domain::HistoryPage;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateSessionBody {
    pub agent_id: String,
}

/// POST /api/sessions — create a session up front.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> impl IntoResponse {
    let session = state.sessions.create(&body.agent_id);
    state.metrics.record_session_created(&body.agent_id);
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session.session_id,
            "created_at": session.created_at,
        })),
    )
}

/// GET /api/sessions — session id listing.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let ids = state.sessions.list_ids();
    Json(serde_json::json!({
        "sessions": ids,
        "count": ids.len(),
    }))
}

/// GET /api/sessions/{id} — full session including trace.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.get(&id) {
        Ok(session) => (StatusCode::OK, Json(serde_json::json!(session))),
        Err(e) => not_found(&e),
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// GET /api/sessions/{id}/history?limit&offset — paginated messages plus
/// the summary of any collapsed prefix.
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let session = match state.sessions.get(&id) {
        Ok(s) => s,
        Err(e) => return not_found(&e),
    };

    let total = session.messages.len();
    let start = query.offset.min(total);
    let end = match query.limit {
        Some(limit) => (start + limit).min(total),
        None => total,
    };

    let page = HistoryPage {
        summary: session.summary.clone(),
        messages: session.messages[start..end].to_vec(),
        total,
    };
    (StatusCode::OK, Json(serde_json::json!(page)))
}

/// GET /api/sessions/{id}/metrics — per-session aggregates.
pub async fn session_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.metrics_summary(&id) {
        Ok(summary) => (StatusCode::OK, Json(serde_json::json!(summary))),
        Err(e) => not_found(&e),
    }
}

/// POST /api/sessions/{id}/cancel — abort the in-flight request, if any.
pub async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let cancelled = state.cancel_map.cancel(&id);
    Json(serde_json::json!({ "session_id": id, "cancelled": cancelled }))
}

fn not_found(e: &ao_domain::Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": e.user_message(),
            "error_code": e.code(),
        })),
    )
}
