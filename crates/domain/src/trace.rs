use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The enumerated catalogue of trace events.
///
/// Events marked as metric-bearing drive the metrics collector through the
/// tracer's fixed event→metric mapping; all others produce trace rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    RouterStart,
    OrchestrationStart,
    LlmCallSuccess,
    LlmCallError,
    ToolExecutionSuccess,
    ToolExecutionError,
    RetryAttemptStart,
    RetryAttemptFailed,
    RetryBackoffDelay,
    MaxRetriesExceeded,
    SummarizationStart,
    SummarizationSuccess,
    SummarizationError,
    SessionCreated,
    SessionCompleted,
    FinalResponse,
    TraceTruncated,
}

impl TraceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceEventKind::RouterStart => "router_start",
            TraceEventKind::OrchestrationStart => "orchestration_start",
            TraceEventKind::LlmCallSuccess => "llm_call_success",
            TraceEventKind::LlmCallError => "llm_call_error",
            TraceEventKind::ToolExecutionSuccess => "tool_execution_success",
            TraceEventKind::ToolExecutionError => "tool_execution_error",
            TraceEventKind::RetryAttemptStart => "retry_attempt_start",
            TraceEventKind::RetryAttemptFailed => "retry_attempt_failed",
            TraceEventKind::RetryBackoffDelay => "retry_backoff_delay",
            TraceEventKind::MaxRetriesExceeded => "max_retries_exceeded",
            TraceEventKind::SummarizationStart => "summarization_start",
            TraceEventKind::SummarizationSuccess => "summarization_success",
            TraceEventKind::SummarizationError => "summarization_error",
            TraceEventKind::SessionCreated => "session_created",
            TraceEventKind::SessionCompleted => "session_completed",
            TraceEventKind::FinalResponse => "final_response",
            TraceEventKind::TraceTruncated => "trace_truncated",
        }
    }
}

/// One structured event recorded during processing of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    /// Wallclock timestamp.
    pub timestamp: DateTime<Utc>,
    /// Milliseconds on the process-local monotonic clock, for ordering
    /// and latency math immune to wallclock adjustment.
    pub monotonic_ms: u64,
    pub component: String,
    pub event: TraceEventKind,
    #[serde(default)]
    pub details: Value,
}

impl TraceStep {
    pub fn new(component: impl Into<String>, event: TraceEventKind, details: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            monotonic_ms: monotonic_ms(),
            component: component.into(),
            event,
            details,
        }
    }
}

/// Milliseconds since an arbitrary process-local origin.
pub fn monotonic_ms() -> u64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(TraceEventKind::LlmCallSuccess.as_str(), "llm_call_success");
        assert_eq!(TraceEventKind::MaxRetriesExceeded.as_str(), "max_retries_exceeded");
        let json = serde_json::to_string(&TraceEventKind::RetryBackoffDelay).unwrap();
        assert_eq!(json, "\"retry_backoff_delay\"");
    }

    #[test]
    fn monotonic_clock_is_nondecreasing() {
        let a = monotonic_ms();
        let b = monotonic_ms();
        assert!(b >= a);
    }

    #[test]
    fn trace_step_roundtrips() {
        let step = TraceStep::new(
            "ResilientCaller",
            TraceEventKind::RetryAttemptStart,
            serde_json::json!({"attempt": 1, "max_attempts": 3}),
        );
        let json = serde_json::to_string(&step).unwrap();
        let back: TraceStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event, TraceEventKind::RetryAttemptStart);
        assert_eq!(back.details["attempt"], 1);
    }
}
