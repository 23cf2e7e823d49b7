//! OpenAI-compatible adapter.
//!
//! Serves every configured vendor that follows the OpenAI chat completions
//! contract: OpenAI itself plus Mistral, Grok (x.ai), Qwen (DashScope),
//! DeepSeek, and Kimi (Moonshot). Each tag carries a vendor profile with
//! its base URL and default model; the wire handling is identical.

use std::time::{Duration, Instant};

use serde_json::Value;

use ao_domain::{Error, Message, ProviderTag, Result, Role, ToolCall, ToolSchema};

use crate::keys::ValidatedKey;
use crate::traits::{ChatRequest, ChatResponse, HealthStatus, LlmProvider, Usage};
use crate::util::{categorize_status, from_reqwest, truncate_for_log};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vendor profiles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static wiring for one OpenAI-wire vendor.
#[derive(Debug, Clone, Copy)]
pub struct VendorProfile {
    pub tag: ProviderTag,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub supports_tools: bool,
}

/// Profile lookup for the six OpenAI-wire tags. Anthropic and Gemini have
/// dedicated adapters and are not served here.
pub fn profile(tag: ProviderTag) -> Option<VendorProfile> {
    let p = match tag {
        ProviderTag::Openai => VendorProfile {
            tag,
            base_url: "https://api.openai.com/v1",
            default_model: "gpt-4o",
            supports_tools: true,
        },
        ProviderTag::Mistral => VendorProfile {
            tag,
            base_url: "https://api.mistral.ai/v1",
            default_model: "mistral-large-latest",
            supports_tools: true,
        },
        ProviderTag::Grok => VendorProfile {
            tag,
            base_url: "https://api.x.ai/v1",
            default_model: "grok-2-latest",
            supports_tools: true,
        },
        ProviderTag::Qwen => VendorProfile {
            tag,
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
            default_model: "qwen-plus",
            supports_tools: true,
        },
        ProviderTag::Deepseek => VendorProfile {
            tag,
            base_url: "https://api.deepseek.com/v1",
            default_model: "deepseek-chat",
            supports_tools: true,
        },
        ProviderTag::Kimi => VendorProfile {
            tag,
            base_url: "https://api.moonshot.ai/v1",
            default_model: "moonshot-v1-8k",
            supports_tools: true,
        },
        ProviderTag::Anthropic | ProviderTag::Gemini => return None,
    };
    Some(p)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatAdapter {
    profile: VendorProfile,
    model: String,
    /// `None` when no key was configured; the adapter is then constructed
    /// in an unhealthy state and `chat` fails with `MISSING_API_KEY`.
    key: Option<ValidatedKey>,
    supported_tools: Vec<String>,
    client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    /// Build an adapter for one of the OpenAI-wire tags.
    ///
    /// `key` is the already-validated key, or `None` when the environment
    /// carries no key for this provider. `tool_names` is the registry's
    /// tool-name set, surfaced through `supported_tools()` when the vendor
    /// supports tool calling.
    pub fn new(
        tag: ProviderTag,
        model: Option<&str>,
        key: Option<ValidatedKey>,
        tool_names: &[String],
        call_timeout: Duration,
    ) -> Result<Self> {
        let profile = profile(tag)
            .ok_or_else(|| Error::UnknownProvider(format!("{tag} is not an OpenAI-wire vendor")))?;

        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(from_reqwest)?;

        let supported_tools =
            if profile.supports_tools { tool_names.to_vec() } else { Vec::new() };

        Ok(Self {
            profile,
            model: model.unwrap_or(profile.default_model).to_string(),
            key,
            supported_tools,
            client,
        })
    }

    fn bearer_key(&self) -> Result<&ValidatedKey> {
        self.key
            .as_ref()
            .ok_or_else(|| Error::MissingApiKey(self.profile.tag.as_str().into()))
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.content,
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let tool_calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": if msg.content.is_empty() { Value::Null } else { Value::String(msg.content.clone()) },
                "tool_calls": tool_calls,
            })
        }
        _ => serde_json::json!({
            "role": msg.role.as_str(),
            "content": msg.content,
        }),
    }
}

fn tool_to_openai(tool: &ToolSchema) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, fallback_model: &str, body: &Value) -> Result<ChatResponse> {
    let message = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| Error::MalformedRequest(format!("{provider}: no message in response")))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback_model)
        .to_string();

    Ok(ChatResponse {
        content,
        tool_calls: parse_tool_calls(message),
        usage: body.get("usage").and_then(parse_usage),
        model,
    })
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
            let arguments: Value =
                serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatAdapter {
    fn provider_tag(&self) -> ProviderTag {
        self.profile.tag
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supported_tools(&self) -> &[String] {
        &self.supported_tools
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let key = self.bearer_key()?;
        let url = format!("{}/chat/completions", self.profile.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.profile.tag, model = %self.model, "chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key.as_str())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            tracing::debug!(
                provider = %self.profile.tag,
                status = status.as_u16(),
                body = truncate_for_log(&resp_text, 500),
                "vendor error response"
            );
            return Err(categorize_status(self.profile.tag.as_str(), status.as_u16()));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(self.profile.tag.as_str(), &self.model, &resp_json)
    }

    async fn health(&self) -> HealthStatus {
        let started = Instant::now();
        let key = match self.bearer_key() {
            Ok(k) => k,
            Err(e) => {
                return HealthStatus {
                    ok: false,
                    latency_seconds: 0.0,
                    error: Some(e.code().to_string()),
                }
            }
        };

        let url = format!("{}/models", self.profile.base_url);
        let result = self.client.get(&url).bearer_auth(key.as_str()).send().await;
        let latency_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(resp) if resp.status().is_success() => {
                HealthStatus { ok: true, latency_seconds, error: None }
            }
            Ok(resp) => HealthStatus {
                ok: false,
                latency_seconds,
                error: Some(categorize_status(self.profile.tag.as_str(), resp.status().as_u16())
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
