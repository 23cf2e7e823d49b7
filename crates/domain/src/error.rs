/// Shared error type used across all agent-orchestra crates.
///
/// Every variant carries a stable machine-readable code (see
/// [`Error::code`]) that doubles as the `metadata.error_code` field on
/// failure responses. Only these categorized errors cross component
/// boundaries; vendor error bodies never leave the adapter layer intact.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    // ── Configuration-time ─────────────────────────────────────────
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no API key configured for {0}")]
    MissingApiKey(String),

    #[error("invalid API key for {provider} (key: {masked})")]
    InvalidApiKey { provider: String, masked: String },

    #[error("CORS_ALLOWED_ORIGINS must be set in production")]
    MissingCorsOrigins,

    #[error("no provider key passed format validation in production")]
    NoValidKeys,

    // ── Request validation ─────────────────────────────────────────
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    // ── Provider call ──────────────────────────────────────────────
    #[error("network: {0}")]
    TransientNetwork(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("{provider} returned HTTP {status}")]
    Provider5xx { provider: String, status: u16 },

    #[error("{provider} rejected the request with HTTP {status}")]
    Provider4xx { provider: String, status: u16 },

    #[error("timeout: {0}")]
    Timeout(String),

    // ── Orchestration ──────────────────────────────────────────────
    #[error("tool {0} timed out")]
    ToolTimeout(String),

    #[error("{message} (after {attempts} attempts)")]
    AgentExecution {
        /// Taxonomy code of the underlying failure, or
        /// `RESILIENT_LLM_FAILURE` after retry exhaustion.
        code: &'static str,
        message: String,
        attempts: u32,
    },

    #[error("request deadline exceeded")]
    RequestTimeout,

    #[error("canceled")]
    Canceled,

    // ── Infrastructure ─────────────────────────────────────────────
    #[error("trace append failed: {0}")]
    TraceAppend(String),

    #[error("metrics render failed: {0}")]
    MetricsRender(String),

    #[error("summarization failed: {0}")]
    Summarization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable taxonomy code, used as `metadata.error_code` and as the
    /// `error_type` label on metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) | Error::Json(_) | Error::Config(_) => "MALFORMED_REQUEST",
            Error::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            Error::MissingApiKey(_) => "MISSING_API_KEY",
            Error::InvalidApiKey { .. } => "INVALID_API_KEY",
            Error::MissingCorsOrigins => "MISSING_CORS_ORIGINS_IN_PRODUCTION",
            Error::NoValidKeys => "NO_VALID_KEYS_IN_PRODUCTION",
            Error::MalformedRequest(_) => "MALFORMED_REQUEST",
            Error::UnknownTool(_) => "UNKNOWN_TOOL",
            Error::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Error::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Error::TransientNetwork(_) => "TRANSIENT_NETWORK",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::Provider5xx { .. } => "PROVIDER_5XX",
            Error::Provider4xx { .. } => "PROVIDER_4XX_NON_RATE_LIMIT",
            Error::Timeout(_) => "TIMEOUT",
            Error::ToolTimeout(_) => "TOOL_TIMEOUT",
            Error::AgentExecution { code, .. } => code,
            Error::RequestTimeout => "REQUEST_TIMEOUT",
            Error::Canceled => "CANCELED",
            Error::TraceAppend(_) => "TRACE_APPEND_FAILURE",
            Error::MetricsRender(_) => "METRICS_RENDER_FAILURE",
            Error::Summarization(_) => "SUMMARIZATION_ERROR",
        }
    }

    /// Whether the resilient caller may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientNetwork(_)
                | Error::RateLimited(_)
                | Error::Provider5xx { .. }
                | Error::Timeout(_)
        )
    }

    /// Sanitized, user-facing rendering. Never contains raw keys, vendor
    /// error bodies, or internal identifiers.
    pub fn user_message(&self) -> String {
        match self {
            Error::TransientNetwork(_) => {
                "The language model service could not be reached. Please try again.".into()
            }
            Error::RateLimited(_) => {
                "The language model service is rate limiting requests. Please try again shortly."
                    .into()
            }
            Error::Provider5xx { .. } => {
                "The language model service reported an internal error. Please try again.".into()
            }
            Error::Provider4xx { .. } => {
                "The language model service rejected the request.".into()
            }
            Error::Timeout(_) | Error::RequestTimeout => {
                "The request took too long to complete. Please try again.".into()
            }
            Error::MissingApiKey(provider) => {
                format!("No API key is configured for the {provider} provider.")
            }
            Error::InvalidApiKey { provider, .. } => {
                format!("The API key configured for the {provider} provider is not valid.")
            }
            Error::UnknownProvider(tag) => format!("Unknown provider: {tag}."),
            Error::MalformedRequest(msg) => format!("Invalid request: {msg}."),
            Error::Canceled => "The request was canceled.".into(),
            Error::AgentExecution { message, attempts, .. } => {
                format!("{message} (after {attempts} attempts). Please try again.")
            }
            _ => "An internal error occurred while processing the request. Please try again."
                .into(),
        }
    }

    /// HTTP status the gateway maps this error to on a failure response.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::MalformedRequest(_)
            | Error::UnknownTool(_)
            | Error::InvalidArguments { .. }
            | Error::UnknownProvider(_)
            | Error::Json(_) => 400,
            Error::SessionNotFound(_) => 404,
            Error::RequestTimeout => 504,
            Error::TraceAppend(_) | Error::MetricsRender(_) => 500,
            _ => 502,
        }
    }
}
