//! Resilient model calls: retry with exponential backoff.
//!
//! Wraps any adapter's `chat` with the agent's retry policy. Retry
//! eligibility is decided from the error category alone, never from the
//! message. Backoff sleeps are cancellable; a canceled context aborts the
//! whole call even mid-sleep.

use std::time::Instant;

use ao_domain::{AgentConfig, Error, Result, TraceEventKind};
use ao_providers::{ChatRequest, ChatResponse, LlmProvider};

use super::cancel::CancelToken;
use super::tracer::Tracer;

const COMPONENT: &str = "ResilientCaller";

/// One resilient chat completion: up to `max_attempts` tries with
/// `delay_base · 2^(k−1)` backoff between them. Returns the response plus
/// the number of attempts consumed.
///
/// Non-retryable failures surface immediately, wrapped in
/// [`Error::AgentExecution`] carrying the original taxonomy code. After
/// exhaustion the wrapper carries `RESILIENT_LLM_FAILURE` and a sanitized
/// user-facing message.
pub async fn resilient_chat_completion(
    provider: &dyn LlmProvider,
    config: &AgentConfig,
    req: &ChatRequest,
    tracer: &Tracer,
    cancel: &CancelToken,
) -> Result<(ChatResponse, u32)> {
    let retry = &config.retry;
    let provider_tag = provider.provider_tag().as_str();
    let model = provider.model_name().to_string();
    let mut last_error: Option<Error> = None;

    for attempt in 1..=retry.max_attempts {
        tracer.log(
            COMPONENT,
            TraceEventKind::RetryAttemptStart,
            serde_json::json!({
                "attempt": attempt,
                "max_attempts": retry.max_attempts,
                "provider": provider_tag,
            }),
        );

        let started = Instant::now();
        let outcome = tokio::select! {
            result = provider.chat(req) => result,
            _ = cancel.cancelled() => Err(Error::Canceled),
        };
        let duration_seconds = started.elapsed().as_secs_f64();

        match outcome {
            Ok(response) => {
                let mut details = serde_json::json!({
                    "provider": provider_tag,
                    "model": model,
                    "attempt": attempt,
                    "duration_seconds": duration_seconds,
                });
                if let Some(usage) = &response.usage {
                    details["prompt_tokens"] = usage.prompt_tokens.into();
                    details["completion_tokens"] = usage.completion_tokens.into();
                }
                tracer.log(COMPONENT, TraceEventKind::LlmCallSuccess, details);
                return Ok((response, attempt));
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    provider = provider_tag,
                    attempt,
                    max_attempts = retry.max_attempts,
                    error = %err,
                    "provider call failed, may retry"
                );
                tracer.log(
                    COMPONENT,
                    TraceEventKind::RetryAttemptFailed,
                    serde_json::json!({
                        "attempt": attempt,
                        "error_type": err.code(),
                    }),
                );

                if attempt >= retry.max_attempts {
                    last_error = Some(err);
                    break;
                }

                let delay = retry.backoff_delay(attempt);
                tracer.log(
                    COMPONENT,
                    TraceEventKind::RetryBackoffDelay,
                    serde_json::json!({
                        "delay_seconds": delay.as_secs_f64(),
                        "attempt": attempt,
                        "backoff_formula": format!(
                            "{} * 2^{}",
                            retry.delay_base_secs,
                            attempt - 1
                        ),
                    }),
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(fail_canceled(tracer, provider_tag, &model));
                    }
                }
                last_error = Some(err);
            }
            Err(Error::Canceled) => {
                return Err(fail_canceled(tracer, provider_tag, &model));
            }
            Err(err) => {
                // Non-retryable: fail immediately with the original code.
                tracer.log(
                    COMPONENT,
                    TraceEventKind::LlmCallError,
                    serde_json::json!({
                        "provider": provider_tag,
                        "model": model,
                        "duration_seconds": duration_seconds,
                        "error_type": err.code(),
                    }),
                );
                return Err(Error::AgentExecution {
                    code: err.code(),
                    message: err.user_message(),
                    attempts: attempt,
                });
            }
        }
    }

    // All attempts exhausted.
    let final_error_type = last_error.as_ref().map(|e| e.code()).unwrap_or("unknown");
    let safe_message = last_error
        .as_ref()
        .map(|e| e.user_message())
        .unwrap_or_else(|| "The language model service is unavailable.".into());

    tracer.log(
        COMPONENT,
        TraceEventKind::LlmCallError,
        serde_json::json!({
            "provider": provider_tag,
            "model": model,
            "error_type": final_error_type,
        }),
    );
    tracer.log(
        COMPONENT,
        TraceEventKind::MaxRetriesExceeded,
        serde_json::json!({
            "max_attempts": retry.max_attempts,
            "final_error_type": final_error_type,
            "safe_error_message": safe_message,
        }),
    );

    tracing::error!(
        provider = provider_tag,
        attempts = retry.max_attempts,
        final_error_type,
        "provider call failed after all retry attempts"
    );

    Err(Error::AgentExecution {
        code: "RESILIENT_LLM_FAILURE",
        message: safe_message,
        attempts: retry.max_attempts,
    })
}

fn fail_canceled(tracer: &Tracer, provider: &str, model: &str) -> Error {
    tracer.log(
        COMPONENT,
        TraceEventKind::LlmCallError,
        serde_json::json!({
            "provider": provider,
            "model": model,
            "error_type": "CANCELED",
        }),
    );
    Error::Canceled
}
