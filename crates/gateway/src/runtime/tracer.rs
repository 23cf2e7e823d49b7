//! Per-session tracer.
//!
//! One event stream feeds two sinks: every `log` call appends a trace step
//! to the session (through the store) and, for metric-bearing events,
//! drives the corresponding collector method. The event→metric mapping is
//! fixed and lives entirely in this module.
//!
//! Tracing is auxiliary: a failure to append a step is logged locally and
//! counted, never propagated to the caller.

use std::sync::Arc;

use serde_json::Value;

use ao_domain::{TraceEventKind, TraceStep};
use ao_metrics::MetricsCollector;
use ao_sessions::SessionStore;

pub struct Tracer {
    session_id: String,
    store: Arc<SessionStore>,
    metrics: Arc<MetricsCollector>,
}

impl Tracer {
    pub fn new(
        session_id: impl Into<String>,
        store: Arc<SessionStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { session_id: session_id.into(), store, metrics }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record one event: append the trace step and mirror it to metrics.
    pub fn log(&self, component: &str, event: TraceEventKind, details: Value) {
        self.collect_metrics(component, event, &details);

        let step = TraceStep::new(component, event, details);
        if let Err(e) = self.store.append_trace_step(&self.session_id, step) {
            tracing::warn!(
                session_id = %self.session_id,
                component,
                event = event.as_str(),
                error = %e,
                "failed to append trace step"
            );
            self.metrics.record_orchestrator_error("TRACE_APPEND_FAILURE", component);
        }

        tracing::debug!(
            session_id = %self.session_id,
            component,
            event = event.as_str(),
            "trace step"
        );
    }

    // ── Event → metric mapping ─────────────────────────────────────

    fn collect_metrics(&self, component: &str, event: TraceEventKind, details: &Value) {
        let str_of = |key: &str| details.get(key).and_then(|v| v.as_str()).unwrap_or("unknown");
        let f64_of = |key: &str| details.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);

        match event {
            TraceEventKind::LlmCallSuccess => {
                let provider = str_of("provider");
                let model = str_of("model");
                self.metrics.record_llm_call(
                    provider,
                    model,
                    f64_of("duration_seconds"),
                    "success",
                );
                let prompt = details.get("prompt_tokens").and_then(|v| v.as_u64());
                let completion = details.get("completion_tokens").and_then(|v| v.as_u64());
                if prompt.is_some() || completion.is_some() {
                    self.metrics.record_llm_tokens(
                        provider,
                        model,
                        prompt.unwrap_or(0) as u32,
                        completion.unwrap_or(0) as u32,
                    );
                }
            }
            TraceEventKind::LlmCallError => {
                self.metrics.record_llm_call(
                    str_of("provider"),
                    str_of("model"),
                    f64_of("duration_seconds"),
                    "error",
                );
                self.metrics.record_orchestrator_error(str_of("error_type"), component);
            }
            TraceEventKind::ToolExecutionSuccess => {
                self.metrics.record_tool_execution(
                    str_of("tool_name"),
                    f64_of("duration_seconds"),
                    "success",
                );
            }
            TraceEventKind::ToolExecutionError => {
                self.metrics.record_tool_execution(str_of("tool_name"), 0.0, "error");
                self.metrics.record_orchestrator_error(str_of("error_type"), component);
            }
            TraceEventKind::RetryAttemptFailed => {
                self.metrics.record_retry_attempt(component, str_of("error_type"));
            }
            TraceEventKind::SessionCreated => {
                self.metrics.record_session_created(str_of("agent_name"));
            }
            TraceEventKind::SessionCompleted => {
                self.metrics
                    .record_session_completed(str_of("agent_name"), f64_of("duration_seconds"));
            }
            // Everything else produces a trace row only.
            _ => {}
        }
    }
}
