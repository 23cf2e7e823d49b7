//! End-to-end orchestration contract tests against a scriptable stub
//! adapter: single-turn answers, tool-using turns, retry behavior, the
//! iteration cap, and threshold-triggered summarization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ao_domain::config::Config;
use ao_domain::{
    AgentConfig, Error, OrchestrationRequest, ProviderTag, Result, RetryConfig, Role, ToolCall,
    TraceEventKind,
};
use ao_providers::{ChatRequest, ChatResponse, HealthStatus, LlmProvider, Usage};
use ao_gateway::runtime::{CancelToken, Orchestrator};
use ao_gateway::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stub adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One scripted outcome per model call, consumed in order. The last step
/// repeats once the script runs out.
enum Step {
    Text(&'static str),
    ToolCalls(Vec<ToolCall>),
    Fail(fn() -> Error),
}

struct StubProvider {
    steps: Vec<Step>,
    calls: AtomicUsize,
    supported_tools: Vec<String>,
}

impl StubProvider {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            calls: AtomicUsize::new(0),
            supported_tools: vec![
                "calculate_expression".into(),
                "get_current_time".into(),
                "get_system_info".into(),
            ],
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmProvider for StubProvider {
    fn provider_tag(&self) -> ProviderTag {
        ProviderTag::Openai
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }

    fn supported_tools(&self) -> &[String] {
        &self.supported_tools
    }

    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.get(n).unwrap_or_else(|| {
            self.steps.last().expect("stub script must not be empty")
        });
        match step {
            Step::Text(text) => Ok(ChatResponse {
                content: text.to_string(),
                tool_calls: vec![],
                usage: Some(Usage { prompt_tokens: 10, completion_tokens: 5 }),
                model: "stub-model".into(),
            }),
            Step::ToolCalls(calls) => Ok(ChatResponse {
                content: String::new(),
                tool_calls: calls.clone(),
                usage: Some(Usage { prompt_tokens: 10, completion_tokens: 5 }),
                model: "stub-model".into(),
            }),
            Step::Fail(make) => Err(make()),
        }
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus { ok: true, latency_seconds: 0.001, error: None }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn agent_config(tools: Vec<&str>) -> AgentConfig {
    AgentConfig {
        agent_id: "default".into(),
        provider: ProviderTag::Openai,
        model: "gpt-4".into(),
        system_prompt: None,
        temperature: 0.7,
        max_tokens: 1000,
        tools: tools.into_iter().map(String::from).collect(),
        retry: RetryConfig { max_attempts: 3, delay_base_secs: 0.1 },
    }
}

fn request(message: &str, tools: Vec<&str>, session_id: Option<String>) -> OrchestrationRequest {
    let raw = serde_json::json!({
        "message": message,
        "agent_config": serde_json::to_value(agent_config(tools)).unwrap(),
        "session_id": session_id,
    });
    serde_json::from_value(raw).unwrap()
}

fn state() -> AppState {
    AppState::build(Config::default()).unwrap()
}

fn time_call() -> ToolCall {
    ToolCall {
        id: "call_1".into(),
        name: "get_current_time".into(),
        arguments: serde_json::json!({}),
    }
}

fn trace_events(state: &AppState, session_id: &str) -> Vec<(TraceEventKind, serde_json::Value)> {
    state
        .sessions
        .get(session_id)
        .unwrap()
        .trace
        .into_iter()
        .map(|s| (s.event, s.details))
        .collect()
}

fn count_event(events: &[(TraceEventKind, serde_json::Value)], kind: TraceEventKind) -> usize {
    events.iter().filter(|(e, _)| *e == kind).count()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_turn_answer_without_tools() {
    let state = state();
    let provider = StubProvider::new(vec![Step::Text("Hello to you too.")]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(request("Say hello.", vec![], None), provider.clone(), CancelToken::new())
        .await;

    assert_eq!(response.content, "Hello to you too.");
    assert!(response.metadata.error_code.is_none());
    assert!(!response.metadata.retries_happened);
    assert_eq!(provider.call_count(), 1);

    // The session's last message is an assistant message with no tool calls.
    let session = state.sessions.get(&response.session_id).unwrap();
    let last = session.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.tool_calls.is_empty());
    assert_eq!(session.messages.len(), 2); // user + assistant

    let events = trace_events(&state, &response.session_id);
    assert_eq!(count_event(&events, TraceEventKind::LlmCallSuccess), 1);
    assert_eq!(count_event(&events, TraceEventKind::SessionCreated), 1);
    assert_eq!(count_event(&events, TraceEventKind::ToolExecutionSuccess), 0);

    let metrics = state.metrics.render();
    assert!(metrics.contains("session_count_total{agent_name=\"default\",event=\"created\"} 1"));
    assert!(!metrics.contains("tool_execution_count_total{"));
}

#[tokio::test]
async fn tool_using_turn_appends_four_messages() {
    let state = state();
    let provider = StubProvider::new(vec![
        Step::ToolCalls(vec![time_call()]),
        Step::Text("It is noon UTC."),
    ]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(
            request("What time is it?", vec!["get_current_time"], None),
            provider.clone(),
            CancelToken::new(),
        )
        .await;

    assert_eq!(response.content, "It is noon UTC.");
    assert_eq!(provider.call_count(), 2);

    // user, assistant-with-call, tool, assistant-final
    let session = state.sessions.get(&response.session_id).unwrap();
    let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert!(session.messages[1].requests_tools());
    assert_eq!(session.messages[2].tool_call_id.as_deref(), Some("call_1"));

    let events = trace_events(&state, &response.session_id);
    assert_eq!(count_event(&events, TraceEventKind::LlmCallSuccess), 2);
    assert_eq!(count_event(&events, TraceEventKind::ToolExecutionSuccess), 1);

    let metrics = state.metrics.render();
    assert!(metrics.contains(
        "tool_execution_count_total{status=\"success\",tool_name=\"get_current_time\"} 1"
    ));
}

#[tokio::test]
async fn same_turn_tool_calls_execute_in_model_order() {
    let state = state();
    let calls = vec![
        ToolCall {
            id: "call_a".into(),
            name: "calculate_expression".into(),
            arguments: serde_json::json!({"expression": "1 + 1"}),
        },
        ToolCall {
            id: "call_b".into(),
            name: "get_current_time".into(),
            arguments: serde_json::json!({}),
        },
        ToolCall {
            id: "call_c".into(),
            name: "get_system_info".into(),
            arguments: serde_json::json!({}),
        },
    ];
    let provider = StubProvider::new(vec![Step::ToolCalls(calls), Step::Text("done")]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(
            request(
                "Do three things.",
                vec!["calculate_expression", "get_current_time", "get_system_info"],
                None,
            ),
            provider,
            CancelToken::new(),
        )
        .await;

    let session = state.sessions.get(&response.session_id).unwrap();
    let tool_result_ids: Vec<&str> = session
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_result_ids, vec!["call_a", "call_b", "call_c"]);
}

#[tokio::test]
async fn retry_then_success_backs_off_and_recovers() {
    let state = state();
    let provider = StubProvider::new(vec![
        Step::Fail(|| Error::TransientNetwork("connection reset".into())),
        Step::Fail(|| Error::TransientNetwork("connection reset".into())),
        Step::Text("Recovered."),
    ]);

    let mut req = request("Say hello.", vec![], None);
    req.agent_config.retry = RetryConfig { max_attempts: 3, delay_base_secs: 0.1 };

    let started = Instant::now();
    let response = Orchestrator::new(state.clone())
        .run_with_provider(req, provider.clone(), CancelToken::new())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(response.content, "Recovered.");
    assert!(response.metadata.error_code.is_none());
    assert!(response.metadata.retries_happened);
    assert_eq!(provider.call_count(), 3);
    // Backoff law: 0.1 + 0.2 seconds minimum.
    assert!(elapsed.as_secs_f64() >= 0.3, "elapsed {elapsed:?}");

    let events = trace_events(&state, &response.session_id);
    assert_eq!(count_event(&events, TraceEventKind::RetryAttemptFailed), 2);
    assert_eq!(count_event(&events, TraceEventKind::LlmCallSuccess), 1);

    let metrics = state.metrics.render();
    assert!(metrics.contains(
        "retry_attempts_count_total{component=\"ResilientCaller\",retry_reason=\"TRANSIENT_NETWORK\"} 2"
    ));
    assert!(metrics.contains(
        "llm_call_count_total{model=\"stub-model\",provider=\"openai\",status=\"success\"} 1"
    ));
}

#[tokio::test]
async fn retry_attempt_start_timestamps_respect_backoff_law() {
    let state = state();
    let provider = StubProvider::new(vec![
        Step::Fail(|| Error::RateLimited("openai".into())),
        Step::Fail(|| Error::RateLimited("openai".into())),
        Step::Text("ok"),
    ]);

    let mut req = request("Say hello.", vec![], None);
    req.agent_config.retry = RetryConfig { max_attempts: 3, delay_base_secs: 0.1 };

    let response = Orchestrator::new(state.clone())
        .run_with_provider(req, provider, CancelToken::new())
        .await;

    let events = trace_events(&state, &response.session_id);
    let starts: Vec<u64> = state
        .sessions
        .get(&response.session_id)
        .unwrap()
        .trace
        .iter()
        .filter(|s| s.event == TraceEventKind::RetryAttemptStart)
        .map(|s| s.monotonic_ms)
        .collect();
    assert_eq!(starts.len(), 3);
    // Gap k→k+1 is at least delay_base · 2^(k−1); a millisecond of slack
    // absorbs clock truncation.
    assert!(starts[1] - starts[0] >= 99, "first gap {}", starts[1] - starts[0]);
    assert!(starts[2] - starts[1] >= 199, "second gap {}", starts[2] - starts[1]);
    assert_eq!(count_event(&events, TraceEventKind::RetryBackoffDelay), 2);
}

#[tokio::test]
async fn retry_exhaustion_fails_resiliently_with_sanitized_content() {
    let state = state();
    let provider = StubProvider::new(vec![Step::Fail(|| {
        Error::TransientNetwork("secret-internal-hostname refused connection".into())
    })]);

    let mut req = request("Say hello.", vec![], None);
    req.agent_config.retry = RetryConfig { max_attempts: 3, delay_base_secs: 0.1 };

    let response = Orchestrator::new(state.clone())
        .run_with_provider(req, provider.clone(), CancelToken::new())
        .await;

    assert_eq!(response.metadata.error_code.as_deref(), Some("RESILIENT_LLM_FAILURE"));
    assert_eq!(response.metadata.attempts, Some(3));
    assert_eq!(provider.call_count(), 3);
    // The raw error never reaches the user-facing content.
    assert!(!response.content.contains("secret-internal-hostname"));
    assert!(!response.content.is_empty());

    let events = trace_events(&state, &response.session_id);
    assert_eq!(count_event(&events, TraceEventKind::MaxRetriesExceeded), 1);
    assert_eq!(count_event(&events, TraceEventKind::RetryAttemptFailed), 3);
}

#[tokio::test]
async fn non_retryable_error_fails_immediately() {
    let state = state();
    let provider = StubProvider::new(vec![
        Step::Fail(|| Error::Provider4xx { provider: "openai".into(), status: 400 }),
        Step::Text("should never be reached"),
    ]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(request("Say hello.", vec![], None), provider.clone(), CancelToken::new())
        .await;

    assert_eq!(
        response.metadata.error_code.as_deref(),
        Some("PROVIDER_4XX_NON_RATE_LIMIT")
    );
    assert_eq!(provider.call_count(), 1);

    let events = trace_events(&state, &response.session_id);
    assert_eq!(count_event(&events, TraceEventKind::LlmCallError), 1);
    assert_eq!(count_event(&events, TraceEventKind::RetryAttemptFailed), 0);
}

#[tokio::test]
async fn iteration_cap_finalizes_non_fatally() {
    let state = state();
    // The model asks for a tool on every call and never produces text.
    let provider = StubProvider::new(vec![Step::ToolCalls(vec![time_call()])]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(
            request("Loop forever.", vec!["get_current_time"], None),
            provider.clone(),
            CancelToken::new(),
        )
        .await;

    assert_eq!(response.metadata.error_code.as_deref(), Some("MAX_ITERATIONS_REACHED"));
    assert!(!response.content.is_empty()); // synthesized apology
    assert_eq!(provider.call_count(), 10); // default max_iterations

    let events = trace_events(&state, &response.session_id);
    assert_eq!(count_event(&events, TraceEventKind::ToolExecutionSuccess), 10);
    assert_eq!(count_event(&events, TraceEventKind::FinalResponse), 1);
}

#[tokio::test]
async fn unknown_tool_in_call_is_isolated_not_fatal() {
    let state = state();
    let provider = StubProvider::new(vec![
        Step::ToolCalls(vec![ToolCall {
            id: "call_x".into(),
            name: "summon_demon".into(),
            arguments: serde_json::json!({}),
        }]),
        Step::Text("Handled the failure."),
    ]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(
            request("Try something odd.", vec!["get_current_time"], None),
            provider,
            CancelToken::new(),
        )
        .await;

    // The turn completed despite the unknown tool.
    assert!(response.metadata.error_code.is_none());
    let session = state.sessions.get(&response.session_id).unwrap();
    let tool_msg = session.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let body: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(body["error"], "unknown_tool");
    assert_eq!(body["name"], "summon_demon");

    let metrics = state.metrics.render();
    assert!(metrics.contains("status=\"error\",tool_name=\"summon_demon\""));
}

#[tokio::test]
async fn invalid_arguments_are_reported_to_the_model() {
    let state = state();
    let provider = StubProvider::new(vec![
        Step::ToolCalls(vec![ToolCall {
            id: "call_x".into(),
            name: "calculate_expression".into(),
            arguments: serde_json::json!({"expression": 42}),
        }]),
        Step::Text("ok"),
    ]);

    let response = Orchestrator::new(state.clone())
        .run_with_provider(
            request("Compute.", vec!["calculate_expression"], None),
            provider,
            CancelToken::new(),
        )
        .await;

    let session = state.sessions.get(&response.session_id).unwrap();
    let tool_msg = session.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let body: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(body["error"], "invalid_arguments");
}

#[tokio::test]
async fn requesting_tools_from_toolless_adapter_is_malformed() {
    let state = state();
    let mut provider = StubProvider::new(vec![Step::Text("never")]);
    Arc::get_mut(&mut provider).unwrap().supported_tools = vec![];

    let response = Orchestrator::new(state.clone())
        .run_with_provider(
            request("What time is it?", vec!["get_current_time"], None),
            provider.clone(),
            CancelToken::new(),
        )
        .await;

    assert_eq!(response.metadata.error_code.as_deref(), Some("MALFORMED_REQUEST"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn summarization_fires_once_past_threshold() {
    let mut config = Config::default();
    config.summarizer.threshold = 8;
    config.summarizer.keep_recent = 2;
    let state = AppState::build(config).unwrap();

    let provider = StubProvider::new(vec![Step::Text("A dense factual summary of the chat.")]);
    let orchestrator = Orchestrator::new(state.clone());

    // Drive several turns against one session.
    let mut session_id: Option<String> = None;
    for i in 0..5 {
        let response = orchestrator
            .run_with_provider(
                request(&format!("turn {i}"), vec![], session_id.clone()),
                provider.clone(),
                CancelToken::new(),
            )
            .await;
        assert!(response.metadata.error_code.is_none());
        session_id = Some(response.session_id);
    }

    let session_id = session_id.unwrap();
    let session = state.sessions.get(&session_id).unwrap();

    // The collapse happened exactly once and the invariant held.
    assert!(session.summary.is_some());
    assert_eq!(session.message_count, 10);
    assert_eq!(
        session.message_count,
        session.messages.len() + session.summary_covered_count
    );
    assert!(session.messages.len() <= 4); // kept 2 + current turn's pair

    let events = trace_events(&state, &session_id);
    assert_eq!(count_event(&events, TraceEventKind::SummarizationSuccess), 1);
}

#[tokio::test]
async fn summarization_failure_is_not_fatal() {
    let mut config = Config::default();
    config.summarizer.threshold = 2;
    config.summarizer.keep_recent = 1;
    let state = AppState::build(config).unwrap();

    // First call of each turn answers; the summarizer shares the stub and
    // returns empty content on its dedicated step, which is an error.
    let provider = StubProvider::new(vec![
        Step::Text("turn answer"),
        Step::Text(""), // summarizer output: empty → SUMMARIZATION_ERROR
        Step::Text("second answer"),
    ]);
    let orchestrator = Orchestrator::new(state.clone());

    let first = orchestrator
        .run_with_provider(request("one", vec![], None), provider.clone(), CancelToken::new())
        .await;
    let second = orchestrator
        .run_with_provider(
            request("two", vec![], Some(first.session_id.clone())),
            provider.clone(),
            CancelToken::new(),
        )
        .await;

    assert!(second.metadata.error_code.is_none());
    assert_eq!(second.content, "second answer");
    let events = trace_events(&state, &first.session_id);
    assert_eq!(count_event(&events, TraceEventKind::SummarizationError), 1);
    // The unsummarized history survived.
    let session = state.sessions.get(&first.session_id).unwrap();
    assert!(session.summary.is_none());
}

#[tokio::test]
async fn session_reuse_does_not_recreate() {
    let state = state();
    let provider = StubProvider::new(vec![Step::Text("hi")]);
    let orchestrator = Orchestrator::new(state.clone());

    let first = orchestrator
        .run_with_provider(request("one", vec![], None), provider.clone(), CancelToken::new())
        .await;
    let second = orchestrator
        .run_with_provider(
            request("two", vec![], Some(first.session_id.clone())),
            provider.clone(),
            CancelToken::new(),
        )
        .await;

    assert_eq!(first.session_id, second.session_id);
    let events = trace_events(&state, &first.session_id);
    assert_eq!(count_event(&events, TraceEventKind::SessionCreated), 1);
    assert_eq!(state.sessions.get(&first.session_id).unwrap().messages.len(), 4);

    // An unknown session id mints a fresh session instead of failing.
    let third = orchestrator
        .run_with_provider(
            request("three", vec![], Some("no-such-session".into())),
            provider,
            CancelToken::new(),
        )
        .await;
    assert_ne!(third.session_id, "no-such-session");
    assert!(state.sessions.exists(&third.session_id));
}

#[tokio::test]
async fn cancellation_mid_backoff_aborts_with_canceled() {
    let state = state();
    let provider = StubProvider::new(vec![Step::Fail(|| {
        Error::TransientNetwork("flaky".into())
    })]);

    let mut req = request("Say hello.", vec![], None);
    // Long backoff so the cancel lands mid-sleep.
    req.agent_config.retry = RetryConfig { max_attempts: 3, delay_base_secs: 5.0 };

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let response = Orchestrator::new(state.clone())
        .run_with_provider(req, provider, cancel)
        .await;

    assert_eq!(response.metadata.error_code.as_deref(), Some("CANCELED"));
    // Did not sit through the 5 s backoff.
    assert!(started.elapsed().as_secs_f64() < 2.0);

    // Already-appended messages are not rolled back.
    let session = state.sessions.get(&response.session_id).unwrap();
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].role, Role::User);
}

#[tokio::test]
async fn empty_message_is_malformed() {
    let state = state();
    let provider = StubProvider::new(vec![Step::Text("never")]);
    let response = Orchestrator::new(state)
        .run_with_provider(request("   ", vec![], None), provider.clone(), CancelToken::new())
        .await;
    assert_eq!(response.metadata.error_code.as_deref(), Some("MALFORMED_REQUEST"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn metrics_render_is_stable_between_requests() {
    let state = state();
    let provider = StubProvider::new(vec![Step::Text("hi")]);
    Orchestrator::new(state.clone())
        .run_with_provider(request("one", vec![], None), provider, CancelToken::new())
        .await;

    let first = state.metrics.render();
    let second = state.metrics.render();
    assert_eq!(first, second);
}
