use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use ao_domain::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Latency bucket ladder shared by the LLM and tool histograms, seconds.
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Buckets for whole-session durations, seconds.
const SESSION_BUCKETS: &[f64] = &[1.0, 10.0, 60.0, 300.0, 600.0, 1800.0, 3600.0];

/// Centralized metrics collector.
///
/// The series names and label keys below are part of the external
/// contract; dashboards depend on them verbatim.
pub struct MetricsCollector {
    registry: Registry,

    llm_call_count: IntCounterVec,
    llm_latency: HistogramVec,
    llm_tokens_consumed: IntCounterVec,
    tool_execution_count: IntCounterVec,
    tool_latency: HistogramVec,
    orchestrator_errors: IntCounterVec,
    retry_attempts: IntCounterVec,
    session_count: IntCounterVec,
    active_sessions: IntGauge,
    session_duration: HistogramVec,
}

impl MetricsCollector {
    /// Build a collector with a fresh private registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let llm_call_count = IntCounterVec::new(
            Opts::new("llm_call_count_total", "Total number of LLM API calls"),
            &["provider", "model", "status"],
        )
        .map_err(reg_err)?;

        let llm_latency = HistogramVec::new(
            HistogramOpts::new("llm_latency_seconds", "Latency of LLM API calls in seconds")
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["provider", "model"],
        )
        .map_err(reg_err)?;

        let llm_tokens_consumed = IntCounterVec::new(
            Opts::new("llm_tokens_consumed_total", "Total tokens consumed by LLM calls"),
            &["provider", "model", "token_type"],
        )
        .map_err(reg_err)?;

        let tool_execution_count = IntCounterVec::new(
            Opts::new("tool_execution_count_total", "Total number of tool executions"),
            &["tool_name", "status"],
        )
        .map_err(reg_err)?;

        let tool_latency = HistogramVec::new(
            HistogramOpts::new("tool_latency_seconds", "Tool execution latency in seconds")
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["tool_name"],
        )
        .map_err(reg_err)?;

        let orchestrator_errors = IntCounterVec::new(
            Opts::new("orchestrator_errors_count_total", "Total number of orchestrator errors"),
            &["error_type", "component"],
        )
        .map_err(reg_err)?;

        let retry_attempts = IntCounterVec::new(
            Opts::new("retry_attempts_count_total", "Total number of retry attempts"),
            &["component", "retry_reason"],
        )
        .map_err(reg_err)?;

        let session_count = IntCounterVec::new(
            Opts::new("session_count_total", "Session lifecycle events"),
            &["agent_name", "event"],
        )
        .map_err(reg_err)?;

        let active_sessions =
            IntGauge::new("active_sessions_current", "Current number of active sessions")
                .map_err(reg_err)?;

        let session_duration = HistogramVec::new(
            HistogramOpts::new("session_duration_seconds", "Session duration in seconds")
                .buckets(SESSION_BUCKETS.to_vec()),
            &["agent_name"],
        )
        .map_err(reg_err)?;

        let application_info = IntGaugeVec::new(
            Opts::new("application_info", "Application information"),
            &["version"],
        )
        .map_err(reg_err)?;
        application_info.with_label_values(&[VERSION]).set(1);

        for collector in [
            Box::new(llm_call_count.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(llm_latency.clone()),
            Box::new(llm_tokens_consumed.clone()),
            Box::new(tool_execution_count.clone()),
            Box::new(tool_latency.clone()),
            Box::new(orchestrator_errors.clone()),
            Box::new(retry_attempts.clone()),
            Box::new(session_count.clone()),
            Box::new(active_sessions.clone()),
            Box::new(session_duration.clone()),
            Box::new(application_info),
        ] {
            registry.register(collector).map_err(reg_err)?;
        }

        Ok(Self {
            registry,
            llm_call_count,
            llm_latency,
            llm_tokens_consumed,
            tool_execution_count,
            tool_latency,
            orchestrator_errors,
            retry_attempts,
            session_count,
            active_sessions,
            session_duration,
        })
    }

    // ── LLM ────────────────────────────────────────────────────────

    pub fn record_llm_call(
        &self,
        provider: &str,
        model: &str,
        duration_seconds: f64,
        status: &str,
    ) {
        self.llm_call_count.with_label_values(&[provider, model, status]).inc();
        self.llm_latency.with_label_values(&[provider, model]).observe(duration_seconds);
    }

    pub fn record_llm_tokens(
        &self,
        provider: &str,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) {
        self.llm_tokens_consumed
            .with_label_values(&[provider, model, "prompt"])
            .inc_by(u64::from(prompt_tokens));
        self.llm_tokens_consumed
            .with_label_values(&[provider, model, "completion"])
            .inc_by(u64::from(completion_tokens));
    }

    // ── Tools ──────────────────────────────────────────────────────

    pub fn record_tool_execution(&self, tool_name: &str, duration_seconds: f64, status: &str) {
        self.tool_execution_count.with_label_values(&[tool_name, status]).inc();
        if status == "success" {
            self.tool_latency.with_label_values(&[tool_name]).observe(duration_seconds);
        }
    }

    // ── Errors / retries ───────────────────────────────────────────

    pub fn record_orchestrator_error(&self, error_type: &str, component: &str) {
        self.orchestrator_errors.with_label_values(&[error_type, component]).inc();
    }

    pub fn record_retry_attempt(&self, component: &str, retry_reason: &str) {
        self.retry_attempts.with_label_values(&[component, retry_reason]).inc();
    }

    // ── Sessions ───────────────────────────────────────────────────

    pub fn record_session_created(&self, agent_name: &str) {
        self.session_count.with_label_values(&[agent_name, "created"]).inc();
        self.active_sessions.inc();
    }

    pub fn record_session_completed(&self, agent_name: &str, duration_seconds: f64) {
        self.session_count.with_label_values(&[agent_name, "completed"]).inc();
        self.active_sessions.dec();
        self.session_duration.with_label_values(&[agent_name]).observe(duration_seconds);
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    // ── Rendering ──────────────────────────────────────────────────

    /// Render all series as OpenMetrics text.
    ///
    /// A render failure must not block serving: the fallback payload
    /// carries only `application_info` and the render-failure counter,
    /// which is also bumped on the live registry for the next scrape.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        match TextEncoder::new().encode(&families, &mut buf) {
            Ok(()) => match String::from_utf8(buf) {
                Ok(text) => text,
                Err(e) => self.render_fallback(&Error::MetricsRender(e.to_string())),
            },
            Err(e) => self.render_fallback(&Error::MetricsRender(e.to_string())),
        }
    }

    fn render_fallback(&self, err: &Error) -> String {
        tracing::error!(error = %err, "metrics render failed, serving fallback payload");
        self.record_orchestrator_error("METRICS_RENDER_FAILURE", "MetricsCollector");
        format!(
            "# HELP application_info Application information\n\
             # TYPE application_info gauge\n\
             application_info{{version=\"{VERSION}\"}} 1\n\
             # HELP orchestrator_errors_count_total Total number of orchestrator errors\n\
             # TYPE orchestrator_errors_count_total counter\n\
             orchestrator_errors_count_total{{error_type=\"METRICS_RENDER_FAILURE\",component=\"MetricsCollector\"}} 1\n"
        )
    }
}

fn reg_err(e: prometheus::Error) -> Error {
    Error::MetricsRender(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_contract_series_names() {
        let m = MetricsCollector::new().unwrap();
        m.record_llm_call("openai", "gpt-4o", 0.42, "success");
        m.record_llm_tokens("openai", "gpt-4o", 100, 20);
        m.record_tool_execution("get_current_time", 0.003, "success");
        m.record_orchestrator_error("RATE_LIMITED", "ResilientCaller");
        m.record_retry_attempt("ResilientCaller", "TRANSIENT_NETWORK");
        m.record_session_created("default");

        let text = m.render();
        for series in [
            "llm_call_count_total",
            "llm_latency_seconds",
            "llm_tokens_consumed_total",
            "tool_execution_count_total",
            "tool_latency_seconds",
            "orchestrator_errors_count_total",
            "retry_attempts_count_total",
            "session_count_total",
            "active_sessions_current",
            "application_info",
        ] {
            assert!(text.contains(series), "render missing {series}");
        }
        assert!(text.contains("provider=\"openai\""));
        assert!(text.contains("token_type=\"prompt\""));
        assert!(text.contains("status=\"success\""));
    }

    #[test]
    fn render_is_idempotent_without_new_events() {
        let m = MetricsCollector::new().unwrap();
        m.record_llm_call("openai", "gpt-4o", 0.1, "success");
        let first = m.render();
        let second = m.render();
        assert_eq!(first, second);
    }

    #[test]
    fn active_sessions_gauge_tracks_lifecycle() {
        let m = MetricsCollector::new().unwrap();
        assert_eq!(m.active_sessions(), 0);
        m.record_session_created("default");
        m.record_session_created("default");
        assert_eq!(m.active_sessions(), 2);
        m.record_session_completed("default", 12.5);
        assert_eq!(m.active_sessions(), 1);

        let text = m.render();
        assert!(text.contains("event=\"created\""));
        assert!(text.contains("event=\"completed\""));
        assert!(text.contains("session_duration_seconds"));
    }

    #[test]
    fn latency_buckets_match_contract() {
        let m = MetricsCollector::new().unwrap();
        m.record_llm_call("openai", "gpt-4o", 0.3, "success");
        let text = m.render();
        for bound in ["0.05", "0.25", "2.5", "30"] {
            assert!(
                text.contains(&format!("le=\"{bound}\"")),
                "missing bucket bound {bound}"
            );
        }
    }

    #[test]
    fn isolated_registries_do_not_interfere() {
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.record_llm_call("openai", "gpt-4o", 0.1, "success");
        assert!(a.render().contains("llm_call_count_total{"));
        assert!(!b.render().contains("llm_call_count_total{"));
    }

    #[test]
    fn tool_errors_do_not_pollute_latency() {
        let m = MetricsCollector::new().unwrap();
        m.record_tool_execution("get_current_time", 0.0, "error");
        let text = m.render();
        assert!(text.contains("tool_execution_count_total"));
        assert!(text.contains("status=\"error\""));
        assert!(!text.contains("tool_latency_seconds_count"));
    }
}
