use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use ao_domain::OrchestrationRequest;

use crate::runtime::Orchestrator;
use crate::state::AppState;

/// POST /api/orchestrate — run one request through the agent loop.
///
/// The orchestrator always returns a well-formed response body; this
/// handler only maps `metadata.error_code` onto an HTTP status.
pub async fn orchestrate(
    State(state): State<AppState>,
    Json(request): Json<OrchestrationRequest>,
) -> impl IntoResponse {
    // A cancel token scoped to this request. Known sessions register it so
    // POST /api/sessions/{id}/cancel can abort mid-flight work.
    let cancel_key = request.session_id.clone();
    let cancel = match &cancel_key {
        Some(id) => state.cancel_map.register(id),
        None => crate::runtime::CancelToken::new(),
    };

    let response = Orchestrator::new(state.clone()).run(request, cancel).await;

    if let Some(id) = &cancel_key {
        state.cancel_map.remove(id);
    }

    let status = status_for(response.metadata.error_code.as_deref());
    (status, Json(response))
}

/// HTTP status for an orchestration outcome. Non-fatal codes still ship
/// with 200 since the response carries usable content.
fn status_for(error_code: Option<&str>) -> StatusCode {
    match error_code {
        None | Some("MAX_ITERATIONS_REACHED") | Some("SUMMARIZATION_ERROR") => StatusCode::OK,
        Some("MALFORMED_REQUEST") | Some("UNKNOWN_TOOL") | Some("INVALID_ARGUMENTS")
        | Some("UNKNOWN_PROVIDER") => StatusCode::BAD_REQUEST,
        Some("SESSION_NOT_FOUND") => StatusCode::NOT_FOUND,
        Some("REQUEST_TIMEOUT") => StatusCode::GATEWAY_TIMEOUT,
        Some("TRACE_APPEND_FAILURE") | Some("METRICS_RENDER_FAILURE") => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Some(_) => StatusCode::BAD_GATEWAY,
    }
}
