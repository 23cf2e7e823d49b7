use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::Message;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider tags
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The enumerated set of supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Openai,
    Anthropic,
    Gemini,
    Mistral,
    Grok,
    Qwen,
    Deepseek,
    Kimi,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Openai => "openai",
            ProviderTag::Anthropic => "anthropic",
            ProviderTag::Gemini => "gemini",
            ProviderTag::Mistral => "mistral",
            ProviderTag::Grok => "grok",
            ProviderTag::Qwen => "qwen",
            ProviderTag::Deepseek => "deepseek",
            ProviderTag::Kimi => "kimi",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderTag::Openai => "OPENAI_API_KEY",
            ProviderTag::Anthropic => "ANTHROPIC_API_KEY",
            ProviderTag::Gemini => "GEMINI_API_KEY",
            ProviderTag::Mistral => "MISTRAL_API_KEY",
            ProviderTag::Grok => "GROK_API_KEY",
            ProviderTag::Qwen => "QWEN_API_KEY",
            ProviderTag::Deepseek => "DEEPSEEK_API_KEY",
            ProviderTag::Kimi => "KIMI_K2_API_KEY",
        }
    }

    pub fn all() -> [ProviderTag; 8] {
        [
            ProviderTag::Openai,
            ProviderTag::Anthropic,
            ProviderTag::Gemini,
            ProviderTag::Mistral,
            ProviderTag::Grok,
            ProviderTag::Qwen,
            ProviderTag::Deepseek,
            ProviderTag::Kimi,
        ]
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(ProviderTag::Openai),
            "anthropic" => Ok(ProviderTag::Anthropic),
            "gemini" => Ok(ProviderTag::Gemini),
            "mistral" => Ok(ProviderTag::Mistral),
            "grok" => Ok(ProviderTag::Grok),
            "qwen" => Ok(ProviderTag::Qwen),
            "deepseek" => Ok(ProviderTag::Deepseek),
            "kimi" | "kimi_k2" => Ok(ProviderTag::Kimi),
            other => Err(Error::UnknownProvider(other.to_string())),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retry policy for provider calls.
///
/// Attempt `k` (1-indexed) sleeps `delay_base · 2^(k−1)` seconds before
/// attempt `k+1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_delay_base")]
    pub delay_base_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, delay_base_secs: 1.0 }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(Error::MalformedRequest(format!(
                "retry.max_attempts must be in [1, 10], got {}",
                self.max_attempts
            )));
        }
        if !(0.1..=60.0).contains(&self.delay_base_secs) {
            return Err(Error::MalformedRequest(format!(
                "retry.delay_base_secs must be in [0.1, 60], got {}",
                self.delay_base_secs
            )));
        }
        Ok(())
    }

    /// Backoff before the attempt following attempt `attempt` (1-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        Duration::from_secs_f64(self.delay_base_secs * f64::from(1u32 << exp))
    }
}

fn d_max_attempts() -> u32 {
    3
}
fn d_delay_base() -> f64 {
    1.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named agent configuration against which orchestration runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "d_agent_id")]
    pub agent_id: String,
    pub provider: ProviderTag,
    /// Model name. Empty string means the provider default.
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Enabled tool names; must be a subset of the registry.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn d_agent_id() -> String {
    "default".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_tokens() -> u32 {
    1000
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(Error::MalformedRequest("agent_id must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::MalformedRequest(format!(
                "temperature must be in [0, 2], got {}",
                self.temperature
            )));
        }
        if !(1..=32_768).contains(&self.max_tokens) {
            return Err(Error::MalformedRequest(format!(
                "max_tokens must be in [1, 32768], got {}",
                self.max_tokens
            )));
        }
        self.retry.validate()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestration request / response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationRequest {
    pub message: String,
    pub agent_config: AgentConfig,
    /// Omitted or unknown id → a fresh session is created.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Metadata attached to every orchestration response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub summarization_fired: bool,
    pub retries_happened: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResponse {
    /// Final assistant content, or a sanitized failure message.
    pub content: String,
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub duration_seconds: f64,
    pub metadata: ResponseMetadata,
}

/// Conversation history plus the summary of any collapsed prefix, as
/// shipped to adapters and returned by the history endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub messages: Vec<Message>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tag_roundtrip() {
        for tag in ProviderTag::all() {
            assert_eq!(tag.as_str().parse::<ProviderTag>().unwrap(), tag);
        }
        assert!("yaml".parse::<ProviderTag>().is_err());
    }

    #[test]
    fn kimi_env_var_uses_k2_name() {
        assert_eq!(ProviderTag::Kimi.env_var(), "KIMI_K2_API_KEY");
        assert_eq!(ProviderTag::Openai.env_var(), "OPENAI_API_KEY");
    }

    #[test]
    fn backoff_follows_exponential_law() {
        let retry = RetryConfig { max_attempts: 4, delay_base_secs: 0.5 };
        assert_eq!(retry.backoff_delay(1), Duration::from_secs_f64(0.5));
        assert_eq!(retry.backoff_delay(2), Duration::from_secs_f64(1.0));
        assert_eq!(retry.backoff_delay(3), Duration::from_secs_f64(2.0));
        assert_eq!(retry.backoff_delay(4), Duration::from_secs_f64(4.0));
    }

    #[test]
    fn retry_bounds_enforced() {
        assert!(RetryConfig { max_attempts: 0, delay_base_secs: 1.0 }.validate().is_err());
        assert!(RetryConfig { max_attempts: 11, delay_base_secs: 1.0 }.validate().is_err());
        assert!(RetryConfig { max_attempts: 3, delay_base_secs: 0.01 }.validate().is_err());
        assert!(RetryConfig { max_attempts: 3, delay_base_secs: 61.0 }.validate().is_err());
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn agent_config_bounds_enforced() {
        let base = AgentConfig {
            agent_id: "default".into(),
            provider: ProviderTag::Openai,
            model: "gpt-4o".into(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 1000,
            tools: vec![],
            retry: RetryConfig::default(),
        };
        assert!(base.validate().is_ok());

        let mut hot = base.clone();
        hot.temperature = 2.5;
        assert!(hot.validate().is_err());

        let mut huge = base.clone();
        huge.max_tokens = 40_000;
        assert!(huge.validate().is_err());

        let mut anon = base;
        anon.agent_id = "  ".into();
        assert!(anon.validate().is_err());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let raw = r#"{
            "message": "Say hello.",
            "agent_config": { "provider": "openai", "model": "gpt-4" }
        }"#;
        let req: OrchestrationRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.agent_config.provider, ProviderTag::Openai);
        assert_eq!(req.agent_config.retry.max_attempts, 3);
        assert!(req.session_id.is_none());
        assert!(req.agent_config.tools.is_empty());
    }
}
