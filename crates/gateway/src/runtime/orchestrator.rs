//! The agent orchestrator: a bounded think/act state machine.
//!
//! Each request loops `Summarizing → CallingModel → ExecutingTools →
//! CallingModel → … → Finalizing`, interleaving model calls and tool
//! executions until the model produces a terminal answer, the iteration
//! cap fires, or a non-recoverable error moves the machine to `Failed`.

use std::time::{Duration, Instant};

use ao_domain::{
    AgentConfig, Error, Message, OrchestrationRequest, OrchestrationResponse, ResponseMetadata,
    Result, ToolCall, ToolResult, TraceEventKind,
};
use ao_providers::{ChatRequest, LlmProvider};
use ao_tools::validate_arguments;

use crate::state::AppState;

use super::cancel::CancelToken;
use super::retry::resilient_chat_completion;
use super::summarize;
use super::tracer::Tracer;

const COMPONENT: &str = "Orchestrator";

/// States of the per-request machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Summarizing,
    CallingModel,
    ExecutingTools,
    Finalizing,
    Failed,
}

/// Aggregates carried across loop iterations.
#[derive(Default)]
struct RunTotals {
    prompt_tokens: u32,
    completion_tokens: u32,
    retries_happened: bool,
    summarization_fired: bool,
    iterations: u32,
}

pub struct Orchestrator {
    state: AppState,
}

impl Orchestrator {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run one orchestration request end to end.
    ///
    /// Always produces an [`OrchestrationResponse`]; failures surface as a
    /// sanitized `content` plus `metadata.error_code` rather than an `Err`,
    /// so the HTTP layer only has to map codes to statuses.
    pub async fn run(
        &self,
        request: OrchestrationRequest,
        cancel: CancelToken,
    ) -> OrchestrationResponse {
        let started = Instant::now();
        let config = request.agent_config.clone();

        // ── Provider resolution ──────────────────────────────────────
        let model = if config.model.is_empty() { None } else { Some(config.model.as_str()) };
        let provider = match self.state.factory.get(config.provider, model) {
            Ok(p) => p,
            Err(e) => return failure_response(&config, "", started, &e, None),
        };

        self.run_with_provider(request, provider, cancel).await
    }

    /// Run a request against an already-resolved adapter. Split from
    /// [`Orchestrator::run`] so contract tests (and the smoke-test
    /// endpoint) can substitute a stub adapter for the factory path.
    pub async fn run_with_provider(
        &self,
        request: OrchestrationRequest,
        provider: std::sync::Arc<dyn LlmProvider>,
        cancel: CancelToken,
    ) -> OrchestrationResponse {
        let started = Instant::now();
        let config = request.agent_config.clone();

        if let Err(e) = self.validate_request(&request) {
            return failure_response(&config, "", started, &e, Some(provider.model_name()));
        }

        // Tool mounting is refused, not silently dropped, when the adapter
        // cannot surface tools.
        if !config.tools.is_empty() && provider.supported_tools().is_empty() {
            let e = Error::MalformedRequest(format!(
                "provider {} does not support tool calling",
                config.provider
            ));
            return failure_response(&config, "", started, &e, Some(provider.model_name()));
        }

        // ── Session resolution ───────────────────────────────────────
        let (session_id, is_new) = match &request.session_id {
            Some(id) if self.state.sessions.exists(id) => (id.clone(), false),
            _ => (self.state.sessions.create(&config.agent_id).session_id, true),
        };

        let tracer = Tracer::new(
            session_id.clone(),
            self.state.sessions.clone(),
            self.state.metrics.clone(),
        );

        if is_new {
            tracer.log(
                COMPONENT,
                TraceEventKind::SessionCreated,
                serde_json::json!({ "agent_name": config.agent_id }),
            );
        }
        tracer.log(
            COMPONENT,
            TraceEventKind::RouterStart,
            serde_json::json!({
                "provider": config.provider.as_str(),
                "model": provider.model_name(),
            }),
        );

        // ── User turn ────────────────────────────────────────────────
        if let Err(e) = self
            .state
            .sessions
            .append_message(&session_id, Message::user(&request.message))
        {
            return failure_response(&config, &session_id, started, &e, None);
        }

        // ── The loop, under the end-to-end deadline ──────────────────
        let deadline = Duration::from_secs(self.state.config.orchestrator.request_timeout_secs);
        let outcome = tokio::time::timeout(
            deadline,
            self.run_loop(&config, provider.as_ref(), &tracer, &cancel),
        )
        .await;

        let duration_seconds = started.elapsed().as_secs_f64();
        let response = match outcome {
            Ok((content, totals, error)) => {
                let content = match &error {
                    Some(e) if content.is_empty() => e.user_message(),
                    _ => content,
                };
                tracer.log(
                    COMPONENT,
                    TraceEventKind::FinalResponse,
                    serde_json::json!({
                        "response_length": content.len(),
                        "total_iterations": totals.iterations,
                        "summarization_fired": totals.summarization_fired,
                    }),
                );
                OrchestrationResponse {
                    content,
                    session_id: session_id.clone(),
                    provider: config.provider.as_str().to_string(),
                    model: provider.model_name().to_string(),
                    duration_seconds,
                    metadata: ResponseMetadata {
                        error_code: error.as_ref().map(|e| e.code().to_string()),
                        attempts: error.as_ref().and_then(attempts_of),
                        prompt_tokens: Some(totals.prompt_tokens),
                        completion_tokens: Some(totals.completion_tokens),
                        summarization_fired: totals.summarization_fired,
                        retries_happened: totals.retries_happened,
                    },
                }
            }
            Err(_) => {
                tracing::error!(session_id = %session_id, "request deadline exceeded");
                failure_response(
                    &config,
                    &session_id,
                    started,
                    &Error::RequestTimeout,
                    Some(provider.model_name()),
                )
            }
        };

        // Lifecycle bookkeeping fires once per session so the active-
        // sessions gauge stays balanced against `session_created`.
        if let Ok(true) = self.state.sessions.mark_completed(&session_id) {
            tracer.log(
                COMPONENT,
                TraceEventKind::SessionCompleted,
                serde_json::json!({
                    "agent_name": config.agent_id,
                    "duration_seconds": duration_seconds,
                }),
            );
        }

        response
    }

    fn validate_request(&self, request: &OrchestrationRequest) -> Result<()> {
        if request.message.trim().is_empty() {
            return Err(Error::MalformedRequest("message must not be empty".into()));
        }
        request.agent_config.validate()?;
        for tool in &request.agent_config.tools {
            if !self.state.tools.contains(tool) {
                return Err(Error::UnknownTool(tool.clone()));
            }
        }
        Ok(())
    }

    /// The state machine proper. Returns the final content, the run
    /// totals, and the terminal error if the machine ended in `Failed`
    /// (or the non-fatal iteration-cap marker).
    async fn run_loop(
        &self,
        config: &AgentConfig,
        provider: &dyn LlmProvider,
        tracer: &Tracer,
        cancel: &CancelToken,
    ) -> (String, RunTotals, Option<Error>) {
        let mut totals = RunTotals::default();
        let mut state = State::Summarizing;
        let mut last_content = String::new();
        let max_iterations = self.state.config.orchestrator.max_iterations;

        let tool_schemas = match self.state.tools.schemas_for(&config.tools) {
            Ok(s) => s,
            Err(e) => return (String::new(), totals, Some(e)),
        };

        tracer.log(
            COMPONENT,
            TraceEventKind::OrchestrationStart,
            serde_json::json!({
                "agent_name": config.agent_id,
                "tools": config.tools,
                "max_iterations": max_iterations,
            }),
        );

        while totals.iterations < max_iterations {
            totals.iterations += 1;
            transition(&mut state, State::Summarizing, tracer.session_id());

            if cancel.is_cancelled() {
                transition(&mut state, State::Failed, tracer.session_id());
                return (last_content, totals, Some(Error::Canceled));
            }

            if summarize::summarize_if_needed(
                &self.state.sessions,
                &self.state.factory,
                config,
                provider,
                &self.state.config.summarizer,
                tracer,
            )
            .await
            {
                totals.summarization_fired = true;
            }

            transition(&mut state, State::CallingModel, tracer.session_id());
            let req = match self.build_chat_request(config, &tool_schemas, tracer.session_id()) {
                Ok(r) => r,
                Err(e) => {
                    transition(&mut state, State::Failed, tracer.session_id());
                    return (last_content, totals, Some(e));
                }
            };

            let (response, attempts) =
                match resilient_chat_completion(provider, config, &req, tracer, cancel).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        transition(&mut state, State::Failed, tracer.session_id());
                        return (last_content, totals, Some(e));
                    }
                };

            if attempts > 1 {
                totals.retries_happened = true;
            }
            if let Some(usage) = &response.usage {
                totals.prompt_tokens += usage.prompt_tokens;
                totals.completion_tokens += usage.completion_tokens;
            }

            // ── Terminal answer ──────────────────────────────────────
            if response.tool_calls.is_empty() {
                transition(&mut state, State::Finalizing, tracer.session_id());
                let content = response.content;
                if let Err(e) = self
                    .state
                    .sessions
                    .append_message(tracer.session_id(), Message::assistant(&content))
                {
                    return (content, totals, Some(e));
                }
                return (content, totals, None);
            }

            // ── Tool execution, sequential in model order ────────────
            transition(&mut state, State::ExecutingTools, tracer.session_id());
            last_content = response.content.clone();
            let assistant_msg =
                Message::assistant_with_tools(response.content, response.tool_calls.clone());
            if let Err(e) = self.state.sessions.append_message(tracer.session_id(), assistant_msg)
            {
                return (last_content, totals, Some(e));
            }

            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    transition(&mut state, State::Failed, tracer.session_id());
                    return (last_content, totals, Some(Error::Canceled));
                }
                let result = self.execute_tool_call(call, tracer, cancel).await;
                if let Err(e) = self
                    .state
                    .sessions
                    .append_message(tracer.session_id(), result.into_message())
                {
                    return (last_content, totals, Some(e));
                }
            }
        }

        // Iteration cap reached: non-fatal finalization with the last
        // assistant content, or a synthesized apology when there is none.
        tracing::warn!(
            session_id = %tracer.session_id(),
            max_iterations,
            "iteration cap reached without a terminal answer"
        );
        let content = if last_content.is_empty() {
            "I could not reach a final answer within the allowed number of reasoning steps. \
             Please try rephrasing or narrowing the request."
                .to_string()
        } else {
            last_content
        };
        let _ = self
            .state
            .sessions
            .append_message(tracer.session_id(), Message::assistant(&content));
        (
            content,
            totals,
            Some(Error::AgentExecution {
                code: "MAX_ITERATIONS_REACHED",
                message: "iteration cap reached".into(),
                attempts: max_iterations,
            }),
        )
    }

    /// Assemble the canonical history for the next model call: system
    /// prompt, then the summary of any collapsed prefix, then the live
    /// messages.
    fn build_chat_request(
        &self,
        config: &AgentConfig,
        tool_schemas: &[ao_domain::ToolSchema],
        session_id: &str,
    ) -> Result<ChatRequest> {
        let session = self.state.sessions.get(session_id)?;

        let mut messages = Vec::with_capacity(session.messages.len() + 2);
        if let Some(prompt) = &config.system_prompt {
            messages.push(Message::system(prompt));
        }
        if let Some(summary) = &session.summary {
            messages.push(Message::system(format!(
                "Summary of the earlier conversation: {summary}"
            )));
        }
        messages.extend(session.messages);

        Ok(ChatRequest::from_agent(config, messages, tool_schemas.to_vec()))
    }

    /// Execute one tool call with lookup, argument validation, and the
    /// per-tool timeout. Tool-level failures become error-shaped tool
    /// results; they never abort the surrounding turn.
    async fn execute_tool_call(
        &self,
        call: &ToolCall,
        tracer: &Tracer,
        cancel: &CancelToken,
    ) -> ToolResult {
        let tool = match self.state.tools.get(&call.name) {
            Ok(t) => t,
            Err(_) => {
                tracer.log(
                    COMPONENT,
                    TraceEventKind::ToolExecutionError,
                    serde_json::json!({
                        "tool_name": call.name,
                        "error_type": "UNKNOWN_TOOL",
                    }),
                );
                return ToolResult::new(
                    call.id.clone(),
                    serde_json::json!({"error": "unknown_tool", "name": call.name}).to_string(),
                );
            }
        };

        if let Err(e) = validate_arguments(tool.schema(), &call.arguments) {
            tracer.log(
                COMPONENT,
                TraceEventKind::ToolExecutionError,
                serde_json::json!({
                    "tool_name": call.name,
                    "error_type": "INVALID_ARGUMENTS",
                }),
            );
            return ToolResult::new(
                call.id.clone(),
                serde_json::json!({
                    "error": "invalid_arguments",
                    "name": call.name,
                    "message": e.user_message(),
                })
                .to_string(),
            );
        }

        let timeout = Duration::from_secs(self.state.config.orchestrator.tool_timeout_secs);
        let started = Instant::now();
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, tool.execute(&call.arguments)) => result,
            _ = cancel.cancelled() => Ok(Err(Error::Canceled)),
        };
        let duration_seconds = started.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(value)) => {
                tracer.log(
                    COMPONENT,
                    TraceEventKind::ToolExecutionSuccess,
                    serde_json::json!({
                        "tool_name": call.name,
                        "duration_seconds": duration_seconds,
                    }),
                );
                ToolResult::new(call.id.clone(), value.to_string())
            }
            Ok(Err(e)) => {
                tracer.log(
                    COMPONENT,
                    TraceEventKind::ToolExecutionError,
                    serde_json::json!({
                        "tool_name": call.name,
                        "error_type": e.code(),
                    }),
                );
                ToolResult::new(
                    call.id.clone(),
                    serde_json::json!({
                        "error": "execution_failed",
                        "name": call.name,
                        "code": e.code(),
                    })
                    .to_string(),
                )
            }
            Err(_) => {
                tracer.log(
                    COMPONENT,
                    TraceEventKind::ToolExecutionError,
                    serde_json::json!({
                        "tool_name": call.name,
                        "error_type": "TOOL_TIMEOUT",
                    }),
                );
                ToolResult::new(
                    call.id.clone(),
                    serde_json::json!({
                        "error": "timeout",
                        "name": call.name,
                        "timeout_seconds": timeout.as_secs(),
                    })
                    .to_string(),
                )
            }
        }
    }
}

fn transition(state: &mut State, next: State, session_id: &str) {
    if *state != next {
        tracing::debug!(session_id, from = ?state, to = ?next, "state transition");
        *state = next;
    }
}

fn attempts_of(e: &Error) -> Option<u32> {
    match e {
        Error::AgentExecution { attempts, .. } => Some(*attempts),
        _ => None,
    }
}

fn failure_response(
    config: &AgentConfig,
    session_id: &str,
    started: Instant,
    error: &Error,
    model: Option<&str>,
) -> OrchestrationResponse {
    OrchestrationResponse {
        content: error.user_message(),
        session_id: session_id.to_string(),
        provider: config.provider.as_str().to_string(),
        model: model.unwrap_or(&config.model).to_string(),
        duration_seconds: started.elapsed().as_secs_f64(),
        metadata: ResponseMetadata {
            error_code: Some(error.code().to_string()),
            attempts: attempts_of(error),
            prompt_tokens: None,
            completion_tokens: None,
            summarization_fired: false,
            retries_happened: false,
        },
    }
}
