use serde::{Deserialize, Serialize};

use crate::agent::ProviderTag;
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: d_bind() }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard cap on think/act iterations per request.
    #[serde(default = "d_10")]
    pub max_iterations: u32,
    /// Per-tool-execution timeout, seconds.
    #[serde(default = "d_30")]
    pub tool_timeout_secs: u64,
    /// End-to-end request timeout, seconds.
    #[serde(default = "d_300")]
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_iterations: 10, tool_timeout_secs: 30, request_timeout_secs: 300 }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// History summarization policy. The summarization model defaults to the
/// requesting agent's provider/model; both can be overridden here to route
/// summaries through a cheaper model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Non-summary message count at which summarization fires.
    #[serde(default = "d_20")]
    pub threshold: usize,
    /// Messages preserved verbatim after a collapse.
    #[serde(default = "d_6")]
    pub keep_recent: usize,
    #[serde(default)]
    pub provider: Option<ProviderTag>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self { threshold: 20, keep_recent: 6, provider: None, model: None }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Providers / sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Per-provider-call timeout, seconds.
    #[serde(default = "d_60")]
    pub call_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self { call_timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Ceiling on trace steps retained per session; overflow drops oldest.
    #[serde(default = "d_trace_cap")]
    pub trace_cap: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { trace_cap: 10_000 }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deployment environment, from the `ENVIRONMENT` variable. Selects CORS
/// and key-validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Result<Self> {
        match std::env::var("ENVIRONMENT") {
            Ok(v) => match v.as_str() {
                "development" => Ok(Environment::Development),
                "staging" => Ok(Environment::Staging),
                "production" => Ok(Environment::Production),
                other => Err(Error::Config(format!(
                    "ENVIRONMENT must be development|staging|production, got '{other}'"
                ))),
            },
            Err(_) => Ok(Environment::Development),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_bind() -> String {
    "0.0.0.0:8080".into()
}
fn d_10() -> u32 {
    10
}
fn d_20() -> usize {
    20
}
fn d_6() -> usize {
    6
}
fn d_30() -> u64 {
    30
}
fn d_60() -> u64 {
    60
}
fn d_300() -> u64 {
    300
}
fn d_trace_cap() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.orchestrator.max_iterations, 10);
        assert_eq!(config.orchestrator.tool_timeout_secs, 30);
        assert_eq!(config.orchestrator.request_timeout_secs, 300);
        assert_eq!(config.summarizer.threshold, 20);
        assert_eq!(config.summarizer.keep_recent, 6);
        assert_eq!(config.providers.call_timeout_secs, 60);
        assert_eq!(config.sessions.trace_cap, 10_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = r#"
            [summarizer]
            threshold = 8
            keep_recent = 2
            provider = "deepseek"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.summarizer.threshold, 8);
        assert_eq!(config.summarizer.provider, Some(ProviderTag::Deepseek));
        assert_eq!(config.orchestrator.max_iterations, 10);
    }
}
