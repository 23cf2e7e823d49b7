//! Google Gemini generateContent adapter.
//!
//! Gemini speaks its own wire: roles are `user`/`model`, tool definitions
//! are `functionDeclarations`, tool invocations come back as
//! `functionCall` parts (with no call id — this adapter synthesizes one),
//! and results return as `functionResponse` parts.

use std::time::{Duration, Instant};

use serde_json::Value;

use ao_domain::{Error, Message, ProviderTag, Result, Role, ToolCall, ToolSchema};

use crate::keys::ValidatedKey;
use crate::traits::{ChatRequest, ChatResponse, HealthStatus, LlmProvider, Usage};
use crate::util::{categorize_status, from_reqwest, truncate_for_log};

const DEFAULT_MODEL: &str = "gemini-1.5-pro";

pub struct GeminiAdapter {
    base_url: String,
    model: String,
    key: Option<ValidatedKey>,
    supported_tools: Vec<String>,
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(
        model: Option<&str>,
        key: Option<ValidatedKey>,
        tool_names: &[String],
        call_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            key,
            supported_tools: tool_names.to_vec(),
            client,
        })
    }

    pub fn default_model() -> &'static str {
        DEFAULT_MODEL
    }

    fn api_key(&self) -> Result<&ValidatedKey> {
        self.key.as_ref().ok_or_else(|| Error::MissingApiKey("gemini".into()))
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let system: Vec<&str> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(msg_to_gemini)
            .collect();

        let mut body = serde_json::json!({ "contents": contents });

        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": system.join("\n\n")}]
            });
        }

        let mut generation = serde_json::Map::new();
        if let Some(temp) = req.temperature {
            generation.insert("temperature".into(), serde_json::json!(temp));
        }
        if let Some(max) = req.max_tokens {
            generation.insert("maxOutputTokens".into(), serde_json::json!(max));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        if !req.tools.is_empty() {
            let declarations: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_gemini(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => {
            // Gemini matches results to calls by function name, which this
            // adapter encodes into the synthesized call id as `name:n`.
            let name = msg
                .tool_call_id
                .as_deref()
                .and_then(|id| id.split(':').next())
                .unwrap_or("unknown");
            let response: Value =
                serde_json::from_str(&msg.content).unwrap_or(Value::String(msg.content.clone()));
            serde_json::json!({
                "role": "user",
                "parts": [{
                    "functionResponse": {
                        "name": name,
                        "response": {"result": response},
                    }
                }],
            })
        }
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let mut parts: Vec<Value> = Vec::new();
            if !msg.content.is_empty() {
                parts.push(serde_json::json!({"text": msg.content}));
            }
            for tc in &msg.tool_calls {
                parts.push(serde_json::json!({
                    "functionCall": {"name": tc.name, "args": tc.arguments}
                }));
            }
            serde_json::json!({"role": "model", "parts": parts})
        }
        Role::Assistant => {
            serde_json::json!({"role": "model", "parts": [{"text": msg.content}]})
        }
        _ => serde_json::json!({"role": "user", "parts": [{"text": msg.content}]}),
    }
}

fn parse_response(model: &str, body: &Value) -> Result<ChatResponse> {
    let parts = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|cand| cand.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| Error::MalformedRequest("gemini: no candidate parts".into()))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(text);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let arguments = call.get("args").cloned().unwrap_or(Value::Object(Default::default()));
            // Synthesized id; Gemini does not mint one.
            let id = format!("{name}:{}", tool_calls.len());
            tool_calls.push(ToolCall { id, name, arguments });
        }
    }

    let usage = body.get("usageMetadata").and_then(|u| {
        Some(Usage {
            prompt_tokens: u.get("promptTokenCount")?.as_u64()? as u32,
            completion_tokens: u.get("candidatesTokenCount").and_then(|v| v.as_u64()).unwrap_or(0)
                as u32,
        })
    });

    Ok(ChatResponse { content, tool_calls, usage, model: model.to_string() })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for GeminiAdapter {
    fn provider_tag(&self) -> ProviderTag {
        ProviderTag::Gemini
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supported_tools(&self) -> &[String] {
        &self.supported_tools
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let key = self.api_key()?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            key.as_str()
        );
        let body = self.build_body(req);

        tracing::debug!(provider = "gemini", model = %self.model, "chat request");

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            tracing::debug!(
                provider = "gemini",
                status = status.as_u16(),
                body = truncate_for_log(&resp_text, 500),
                "vendor error response"
            );
            return Err(categorize_status("gemini", status.as_u16()));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_response(&self.model, &resp_json)
    }

    async fn health(&self) -> HealthStatus {
        let started = Instant::now();
        let key = match self.api_key() {
            Ok(k) => k,
            Err(e) => {
                return HealthStatus {
                    ok: false,
                    latency_seconds: 0.0,
                    error: Some(e.code().to_string()),
                }
            }
        };

        let url = format!("{}/models?key={}", self.base_url, key.as_str());
        let result = self.client.get(&url).send().await;
        let latency_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(resp) if resp.status().is_success() => {
                HealthStatus { ok: true, latency_seconds, error: None }
            }
            Ok(resp) => HealthStatus {
                ok: false,
                latency_seconds,
                error: Some(categorize_status("gemini", resp.status().as_u16()).code().to_string()),
            },
            Err(e) => HealthStatus {
                ok: false,
                latency_seconds,
                error: Some(from_reqwest(e).code().to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_call_parts_get_synthesized_ids() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"functionCall": {"name": "get_current_time", "args": {}}},
                        {"functionCall": {"name": "get_system_info", "args": {}}}
                    ]
                }
            }],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 4}
        });
        let resp = parse_response("gemini-1.5-pro", &body).unwrap();
        assert_eq!(resp.tool_calls[0].id, "get_current_time:0");
        assert_eq!(resp.tool_calls[1].id, "get_system_info:1");
    }

    #[test]
    fn tool_result_roundtrips_function_name_from_id() {
        let msg = ao_domain::ToolResult::new("get_current_time:0", "{\"time\":\"t\"}").into_message();
        let wire = msg_to_gemini(&msg);
        assert_eq!(wire["parts"][0]["functionResponse"]["name"], "get_current_time");
        assert_eq!(
            wire["parts"][0]["functionResponse"]["response"]["result"]["time"],
            "t"
        );
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let wire = msg_to_gemini(&Message::assistant("hello"));
        assert_eq!(wire["role"], "model");
        let wire = msg_to_gemini(&Message::user("hello"));
        assert_eq!(wire["role"], "user");
    }

    #[test]
    fn tools_serialize_as_function_declarations() {
        let adapter = GeminiAdapter::new(None, None, &[], Duration::from_secs(5)).unwrap();
        let req = ChatRequest {
            messages: vec![Message::user("what time is it")],
            tools: vec![ToolSchema {
                name: "get_current_time".into(),
                description: "Current UTC time".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
            temperature: None,
            max_tokens: None,
        };
        let body = adapter.build_body(&req);
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "get_current_time"
        );
    }
}
