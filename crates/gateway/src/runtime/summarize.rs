//! History summarization — collapses the oldest messages of a long
//! session into a single dense summary so the context stays bounded.
//!
//! Triggered by the orchestrator at the top of each loop iteration.
//! Failures are never fatal: the loop proceeds with the unsummarized
//! history.

use std::time::Instant;

use ao_domain::config::SummarizerConfig;
use ao_domain::{AgentConfig, Message, Result, Role, TraceEventKind};
use ao_providers::{ChatRequest, LlmProvider, ProviderFactory};
use ao_sessions::SessionStore;

use super::tracer::Tracer;

const COMPONENT: &str = "HistorySummarizer";

/// Fixed meta-prompt sent to the summarization model.
const SUMMARY_PROMPT: &str = "Produce a dense factual summary of the following dialogue; \
     preserve decisions, constraints, and open questions; stay under 500 tokens.";

/// Whether the session's live (non-summary) history has crossed the
/// threshold.
pub fn should_summarize(live_message_count: usize, config: &SummarizerConfig) -> bool {
    config.threshold > 0 && live_message_count >= config.threshold
}

/// Split history into the contiguous oldest prefix to collapse and the
/// suffix to keep. At least `keep_recent` messages always survive.
pub fn split_for_summary(messages: &[Message], keep_recent: usize) -> (&[Message], &[Message]) {
    let keep_from = messages.len().saturating_sub(keep_recent.max(1));
    (&messages[..keep_from], &messages[keep_from..])
}

/// Run summarization for the session if its history crossed the
/// threshold. Returns whether a collapse happened.
///
/// `agent_provider` is the adapter already serving this request; it is
/// used for summaries unless the config routes them to a dedicated model.
pub async fn summarize_if_needed(
    store: &SessionStore,
    factory: &ProviderFactory,
    agent: &AgentConfig,
    agent_provider: &dyn LlmProvider,
    config: &SummarizerConfig,
    tracer: &Tracer,
) -> bool {
    let session = match store.get(tracer.session_id()) {
        Ok(s) => s,
        Err(_) => return false,
    };

    if !should_summarize(session.live_message_count(), config) {
        return false;
    }

    let started = Instant::now();
    let before = session.live_message_count();
    tracer.log(
        COMPONENT,
        TraceEventKind::SummarizationStart,
        serde_json::json!({ "messages": before, "threshold": config.threshold }),
    );

    let outcome = run_summarization(
        store,
        factory,
        agent,
        agent_provider,
        config,
        tracer.session_id(),
        &session.messages,
        session.summary.as_deref(),
    )
    .await;

    match outcome {
        Ok(after) => {
            tracer.log(
                COMPONENT,
                TraceEventKind::SummarizationSuccess,
                serde_json::json!({
                    "before_messages": before,
                    "after_messages": after,
                    "elapsed_seconds": started.elapsed().as_secs_f64(),
                }),
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                session_id = %tracer.session_id(),
                error = %e,
                "summarization failed, continuing with full history"
            );
            tracer.log(
                COMPONENT,
                TraceEventKind::SummarizationError,
                serde_json::json!({ "error_type": e.code() }),
            );
            false
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_summarization(
    store: &SessionStore,
    factory: &ProviderFactory,
    agent: &AgentConfig,
    agent_provider: &dyn LlmProvider,
    config: &SummarizerConfig,
    session_id: &str,
    messages: &[Message],
    existing_summary: Option<&str>,
) -> Result<usize> {
    let (to_collapse, to_keep) = split_for_summary(messages, config.keep_recent);
    if to_collapse.is_empty() {
        return Ok(messages.len());
    }

    // A cheaper dedicated model may be configured; default to the adapter
    // already serving the agent.
    let dedicated;
    let provider: &dyn LlmProvider = if config.provider.is_some() || config.model.is_some() {
        let tag = config.provider.unwrap_or(agent.provider);
        dedicated = factory.get(tag, config.model.as_deref())?;
        dedicated.as_ref()
    } else {
        agent_provider
    };

    let mut dialogue = String::new();
    if let Some(summary) = existing_summary {
        dialogue.push_str("Summary of earlier conversation: ");
        dialogue.push_str(summary);
        dialogue.push('\n');
    }
    for msg in to_collapse {
        dialogue.push_str(&format_line(msg));
        dialogue.push('\n');
    }

    let req = ChatRequest {
        messages: vec![
            Message::system(SUMMARY_PROMPT),
            Message::user(format!("DIALOGUE:\n{dialogue}")),
        ],
        tools: vec![],
        temperature: Some(0.3),
        max_tokens: Some(1000),
    };

    let response = provider.chat(&req).await?;
    if response.content.trim().is_empty() {
        return Err(ao_domain::Error::Summarization(
            "summarization model returned no content".into(),
        ));
    }

    let kept: Vec<Message> = to_keep.to_vec();
    let after = kept.len();
    store.replace_summary(session_id, response.content, kept)?;
    Ok(after)
}

fn format_line(msg: &Message) -> String {
    let role = match msg.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
        Role::System => "System",
    };
    let mut content = msg.content.clone();
    // Very long tool output would dominate the prompt.
    if content.len() > 2000 {
        let mut end = 2000;
        while end > 0 && !content.is_char_boundary(end) {
            end -= 1;
        }
        content.truncate(end);
        content.push_str(" […]");
    }
    if msg.content.is_empty() && !msg.tool_calls.is_empty() {
        let names: Vec<&str> = msg.tool_calls.iter().map(|c| c.name.as_str()).collect();
        content = format!("[invoked tools: {}]", names.join(", "));
    }
    format!("{role}: {content}")
}
