//! Anthropic Messages API adapter.
//!
//! The Messages wire differs from OpenAI in three ways this adapter
//! absorbs: the system prompt is a top-level field, assistant tool calls
//! travel as `tool_use` content blocks, and tool results go back as
//! `tool_result` blocks inside a user message.

use std::time::{Duration, Instant};

use serde_json::Value;

use ao_domain::{Error, Message, ProviderTag, Result, Role, ToolCall, ToolSchema};

use crate::keys::ValidatedKey;
use crate::traits::{ChatRequest, ChatResponse, HealthStatus, LlmProvider, Usage};
use crate::util::{categorize_status, from_reqwest, truncate_for_log};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

pub struct AnthropicAdapter {
    base_url: String,
    model: String,
    key: Option<ValidatedKey>,
    supported_tools: Vec<String>,
    client: reqwest::Client,
}

impl AnthropicAdapter {
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
            base_url: "https://api.anthropic.com".into(),
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
        self.key.as_ref().ok_or_else(|| Error::MissingApiKey("anthropic".into()))
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        // System messages are hoisted into the top-level `system` field;
        // the first one wins, later ones are folded in order.
        let system: Vec<&str> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let messages: Vec<Value> = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(msg_to_anthropic)
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(1024),
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n\n"));
        }
        if let Some(temp) = req.temperature {
            // Anthropic caps temperature at 1.0.
            body["temperature"] = serde_json::json!(temp.min(1.0));
        }
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_anthropic(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": msg.tool_call_id.as_deref().unwrap_or(""),
                "content": msg.content,
            }],
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let mut blocks: Vec<Value> = Vec::new();
            if !msg.content.is_empty() {
                blocks.push(serde_json::json!({"type": "text", "text": msg.content}));
            }
            for tc in &msg.tool_calls {
                blocks.push(serde_json::json!({
                    "type": "tool_use",
                    "id": tc.id,
                    "name": tc.name,
                    "input": tc.arguments,
                }));
            }
            serde_json::json!({"role": "assistant", "content": blocks})
        }
        _ => serde_json::json!({
            "role": msg.role.as_str(),
            "content": msg.content,
        }),
    }
}

fn parse_response(model: &str, body: &Value) -> Result<ChatResponse> {
    let blocks = body
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| Error::MalformedRequest("anthropic: no content blocks".into()))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(text);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let arguments = block.get("input").cloned().unwrap_or(Value::Null);
                tool_calls.push(ToolCall { id, name, arguments });
            }
            _ => {}
        }
    }

    let usage = body.get("usage").and_then(|u| {
        Some(Usage {
            prompt_tokens: u.get("input_tokens")?.as_u64()? as u32,
            completion_tokens: u.get("output_tokens")?.as_u64()? as u32,
        })
    });

    let model = body.get("model").and_then(|m| m.as_str()).unwrap_or(model).to_string();

    Ok(ChatResponse { content, tool_calls, usage, model })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicAdapter {
    fn provider_tag(&self) -> ProviderTag {
        ProviderTag::Anthropic
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supported_tools(&self) -> &[String] {
        &self.supported_tools
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let key = self.api_key()?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(req);

        tracing::debug!(provider = "anthropic", model = %self.model, "chat request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", key.as_str())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            tracing::debug!(
                provider = "anthropic",
                status = status.as_u16(),
                body = truncate_for_log(&resp_text, 500),
                "vendor error response"
            );
            return Err(categorize_status("anthropic", status.as_u16()));
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

        let url = format!("{}/v1/models", self.base_url);
        let result = self
            .client
            .get(&url)
            .header("x-api-key", key.as_str())
            .header("anthropic-version", API_VERSION)
            .send()
            .await;
        let latency_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(resp) if resp.status().is_success() => {
                HealthStatus { ok: true, latency_seconds, error: None }
            }
            Ok(resp) => HealthStatus {
                ok: false,
                latency_seconds,
                error: Some(categorize_status("anthropic", resp.status().as_u16())
                    .code()
                    .to_string()),
            },
            Err(e) => HealthStatus {
                ok: false,
                latency_seconds,
                error: Some(from_reqwest(e).code().to_string()),
            },
        }
    }
}
