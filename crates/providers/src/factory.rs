//! Provider factory.
//!
//! Maps a provider tag to a constructed adapter, caching one instance per
//! `(tag, model)` pair for the process lifetime. Keys are resolved from the
//! provider's environment variable at first construction; a missing key
//! yields an adapter in the unhealthy state rather than a construction
//! failure, so listings and health probes still work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use ao_domain::{ProviderTag, Result};

use crate::anthropic::AnthropicAdapter;
use crate::gemini::GeminiAdapter;
use crate::keys::{self, KeyInfo};
use crate::openai_compat::{self, OpenAiCompatAdapter};
use crate::traits::LlmProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderFactory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProviderFactory {
    cache: RwLock<HashMap<(ProviderTag, String), Arc<dyn LlmProvider>>>,
    /// Registry tool names handed to adapters at construction so they can
    /// answer `supported_tools()`.
    tool_names: Vec<String>,
    call_timeout: Duration,
}

/// One row of the provider listing endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderListing {
    pub provider: &'static str,
    pub healthy: bool,
    pub models: Vec<String>,
    pub has_tool_support: bool,
    pub key: KeyInfo,
}

impl ProviderFactory {
    pub fn new(tool_names: Vec<String>, call_timeout: Duration) -> Self {
        Self { cache: RwLock::new(HashMap::new()), tool_names, call_timeout }
    }

    /// Get (or construct and cache) the adapter for `(tag, model)`.
    ///
    /// Fails with `INVALID_API_KEY` when the environment carries a key
    /// that does not match the provider's format.
    pub fn get(&self, tag: ProviderTag, model: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let model_key = model.unwrap_or_else(|| Self::default_model(tag)).to_string();

        if let Some(adapter) = self.cache.read().get(&(tag, model_key.clone())) {
            return Ok(adapter.clone());
        }

        let adapter = self.construct(tag, &model_key)?;

        let mut cache = self.cache.write();
        // A concurrent caller may have raced us here; keep the first one.
        let entry = cache.entry((tag, model_key)).or_insert(adapter);
        Ok(entry.clone())
    }

    fn construct(&self, tag: ProviderTag, model: &str) -> Result<Arc<dyn LlmProvider>> {
        let key = keys::key_from_env(tag)?;
        if key.is_none() {
            tracing::warn!(provider = %tag, env_var = tag.env_var(), "no API key configured");
        }

        let adapter: Arc<dyn LlmProvider> = match tag {
            ProviderTag::Anthropic => Arc::new(AnthropicAdapter::new(
                Some(model),
                key,
                &self.tool_names,
                self.call_timeout,
            )?),
            ProviderTag::Gemini => Arc::new(GeminiAdapter::new(
                Some(model),
                key,
                &self.tool_names,
                self.call_timeout,
            )?),
            _ => Arc::new(OpenAiCompatAdapter::new(
                tag,
                Some(model),
                key,
                &self.tool_names,
                self.call_timeout,
            )?),
        };

        tracing::info!(provider = %tag, model, "constructed LLM adapter");
        Ok(adapter)
    }

    /// The model used when a request leaves the model field empty.
    pub fn default_model(tag: ProviderTag) -> &'static str {
        match tag {
            ProviderTag::Anthropic => AnthropicAdapter::default_model(),
            ProviderTag::Gemini => GeminiAdapter::default_model(),
            other => openai_compat::profile(other)
                .map(|p| p.default_model)
                // Unreachable: every non-Anthropic/Gemini tag has a profile.
                .unwrap_or("gpt-4o"),
        }
    }

    /// Enumerate all supported providers with key state and capabilities.
    /// "Healthy" here means a key is configured and passes format
    /// validation; live reachability is the health endpoint's job.
    pub fn list(&self) -> Vec<ProviderListing> {
        ProviderTag::all()
            .into_iter()
            .map(|tag| {
                let key = keys::key_info(tag);
                ProviderListing {
                    provider: tag.as_str(),
                    healthy: key.configured && key.valid,
                    models: vec![Self::default_model(tag).to_string()],
                    has_tool_support: true,
                    key,
                }
            })
            .collect()
    }

    /// Adapters constructed so far (for aggregated health probes).
    pub fn cached(&self) -> Vec<Arc<dyn LlmProvider>> {
        self.cache.read().values().cloned().collect()
    }
}
