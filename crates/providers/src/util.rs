//! Shared helpers for provider adapters.

use ao_domain::Error;

/// Convert a [`reqwest::Error`] into the categorized domain error.
///
/// Client-side timeouts map to `TIMEOUT`; connection and DNS failures map
/// to `TRANSIENT_NETWORK`, as does anything else that never produced an
/// HTTP status.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::TransientNetwork(e.to_string())
    }
}

/// Categorize a non-success HTTP status from a vendor.
///
/// `429 → RATE_LIMITED`, `5xx → PROVIDER_5XX`, any other 4xx →
/// `PROVIDER_4XX_NON_RATE_LIMIT`. The response body is logged at debug
/// level by callers but never embedded in the error.
pub(crate) fn categorize_status(provider: &str, status: u16) -> Error {
    if status == 429 {
        Error::RateLimited(provider.to_string())
    } else if (500..600).contains(&status) {
        Error::Provider5xx { provider: provider.to_string(), status }
    } else {
        Error::Provider4xx { provider: provider.to_string(), status }
    }
}

/// Truncate a vendor payload for debug logging.
pub(crate) fn truncate_for_log(body: &str, max: usize) -> &str {
    if body.len() <= max {
        body
    } else {
        // Back off to a char boundary so slicing never panics.
        let mut end = max;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        &body[..end]
    }
}
