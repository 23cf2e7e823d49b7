use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use ao_domain::{Message, ProviderTag};
use ao_providers::ChatRequest;

use crate::state::AppState;

/// GET /api/providers — the factory listing with key state.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let providers = state.factory.list();
    Json(serde_json::json!({
        "providers": providers,
        "count": providers.len(),
    }))
}

#[derive(Deserialize)]
pub struct TestServiceBody {
    pub provider: ProviderTag,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "d_test_message")]
    pub message: String,
}

fn d_test_message() -> String {
    "Hello, AI!".into()
}

/// POST /api/test-service — one-shot provider smoke test, bypassing
/// sessions and retries.
pub async fn test_service(
    State(state): State<AppState>,
    Json(body): Json<TestServiceBody>,
) -> impl IntoResponse {
    let provider = match state.factory.get(body.provider, body.model.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "success": false,
                    "provider": body.provider.as_str(),
                    "error": e.user_message(),
                    "error_code": e.code(),
                })),
            )
        }
    };

    let req = ChatRequest {
        messages: vec![Message::user(&body.message)],
        tools: vec![],
        temperature: Some(0.7),
        max_tokens: Some(200),
    };

    match provider.chat(&req).await {
        Ok(resp) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "provider": body.provider.as_str(),
                "model": resp.model,
                "response": resp.content,
            })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "success": false,
                "provider": body.provider.as_str(),
                "error": e.user_message(),
                "error_code": e.code(),
            })),
        ),
    }
}
