//! LLM provider adapters for agent-orchestra.
//!
//! One adapter per backend wire format: [`openai_compat`] covers the six
//! vendors speaking the OpenAI chat-completions contract (OpenAI, Mistral,
//! Grok, Qwen, DeepSeek, Kimi), [`anthropic`] the Messages API, and
//! [`gemini`] generateContent. The [`factory`] maps provider tags to cached
//! adapter instances; [`keys`] owns key-format validation and masking.

pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod keys;
pub mod openai_compat;
pub mod traits;
pub mod util;

pub use factory::{ProviderFactory, ProviderListing};
pub use keys::{mask, validate_key, ValidatedKey};
pub use traits::{ChatRequest, ChatResponse, HealthStatus, LlmProvider, Usage};
