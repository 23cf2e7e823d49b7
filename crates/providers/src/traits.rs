use ao_domain::{AgentConfig, Message, ProviderTag, Result, ToolCall, ToolSchema};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send, system prompt included.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolSchema>,
    /// Sampling temperature (0.0 – 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Assemble a request from an agent config, history, and available tools.
    pub fn from_agent(config: &AgentConfig, history: Vec<Message>, tools: Vec<ToolSchema>) -> Self {
        Self {
            messages: history,
            tools,
            temperature: Some(config.temperature),
            max_tokens: Some(config.max_tokens),
        }
    }
}

/// A provider-agnostic chat completion response: one assistant turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content. May be empty when the model only requests tools.
    pub content: String,
    /// Tool calls in the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Result of an adapter health probe.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub latency_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The capability surface every backend adapter must satisfy.
///
/// `chat` translates the canonical history into the vendor wire format,
/// executes exactly one request (never retrying — retries belong to the
/// resilient caller), and translates the vendor reply back into one
/// assistant turn. Implementations must not mutate the request and must
/// only surface categorized [`ao_domain::Error`] values.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// The provider tag this adapter serves.
    fn provider_tag(&self) -> ProviderTag;

    /// The model this adapter instance targets.
    fn model_name(&self) -> &str;

    /// The subset of registered tool names this adapter can surface to its
    /// vendor. Adapters without tool-calling support answer empty.
    fn supported_tools(&self) -> &[String];

    /// One chat completion round trip.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Probe vendor reachability and measure latency.
    async fn health(&self) -> HealthStatus;
}
