//! API key validation and masking.
//!
//! Keys are validated against a fixed per-provider regex table at adapter
//! construction time. Any rendering of a key anywhere in the system must go
//! through [`mask`], which keeps at most the first and last four characters.

use std::sync::OnceLock;

use regex::Regex;

use ao_domain::{Error, ProviderTag, Result};

/// A key that passed format validation for its provider.
///
/// `Debug` renders the masked form so the raw key cannot leak through
/// derive chains or error formatting.
#[derive(Clone)]
pub struct ValidatedKey {
    key: String,
}

impl ValidatedKey {
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn masked(&self) -> String {
        mask(&self.key)
    }
}

impl std::fmt::Debug for ValidatedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedKey").field("key", &self.masked()).finish()
    }
}

/// Key-format pattern for a provider tag.
fn pattern(tag: ProviderTag) -> &'static str {
    match tag {
        ProviderTag::Openai => r"^sk-[A-Za-z0-9\-_]{40,}$",
        ProviderTag::Anthropic => r"^sk-ant-api03-[A-Za-z0-9\-_]{95}$",
        ProviderTag::Gemini => r"^AIza[A-Za-z0-9_\-]{33,}$",
        ProviderTag::Mistral => r"^[A-Za-z0-9]{32}$",
        ProviderTag::Grok => r"^xai-[A-Za-z0-9]{40}$",
        ProviderTag::Qwen | ProviderTag::Deepseek | ProviderTag::Kimi => r"^sk-[A-Za-z0-9]{40,}$",
    }
}

fn compiled(tag: ProviderTag) -> &'static Regex {
    static TABLE: OnceLock<Vec<(ProviderTag, Regex)>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        ProviderTag::all()
            .into_iter()
            .map(|t| {
                // Patterns are fixed literals; compilation cannot fail.
                let re = Regex::new(pattern(t)).unwrap_or_else(|e| {
                    panic!("invalid key pattern for {t}: {e}");
                });
                (t, re)
            })
            .collect()
    });
    // `all()` covers every variant, so the lookup always hits.
    table.iter().find(|(t, _)| *t == tag).map(|(_, re)| re).unwrap_or(&table[0].1)
}

/// Validate `key` against the provider's format table.
///
/// An empty or absent key is `MISSING_API_KEY`; a present key that fails
/// the format check is `INVALID_API_KEY` carrying only the masked form.
pub fn validate_key(tag: ProviderTag, key: &str) -> Result<ValidatedKey> {
    if key.trim().is_empty() {
        return Err(Error::MissingApiKey(tag.as_str().into()));
    }
    if !compiled(tag).is_match(key) {
        return Err(Error::InvalidApiKey { provider: tag.as_str().into(), masked: mask(key) });
    }
    Ok(ValidatedKey { key: key.to_string() })
}

/// Mask a key for logs and error messages.
///
/// Keeps the first four and last four characters around an ellipsis; keys
/// shorter than twelve characters render as the ellipsis alone.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "…".into();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Read and validate the key for `tag` from its environment variable.
/// Returns `Ok(None)` when the variable is unset.
pub fn key_from_env(tag: ProviderTag) -> Result<Option<ValidatedKey>> {
    match std::env::var(tag.env_var()) {
        Ok(raw) if !raw.trim().is_empty() => validate_key(tag, &raw).map(Some),
        _ => Ok(None),
    }
}

/// Masked configuration summary for a provider, used by the listing
/// endpoint. Never contains the raw key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyInfo {
    pub env_var: &'static str,
    pub configured: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

pub fn key_info(tag: ProviderTag) -> KeyInfo {
    match std::env::var(tag.env_var()) {
        Ok(raw) if !raw.trim().is_empty() => KeyInfo {
            env_var: tag.env_var(),
            configured: true,
            valid: validate_key(tag, &raw).is_ok(),
            masked: Some(mask(&raw)),
        },
        _ => KeyInfo { env_var: tag.env_var(), configured: false, valid: false, masked: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(prefix: &str, body_len: usize) -> String {
        format!("{prefix}{}", "a".repeat(body_len))
    }

    #[test]
    fn openai_shape_accepted() {
        assert!(validate_key(ProviderTag::Openai, &key_of("sk-", 48)).is_ok());
        assert!(validate_key(ProviderTag::Openai, "sk-short").is_err());
        assert!(validate_key(ProviderTag::Openai, &key_of("pk-", 48)).is_err());
    }

    #[test]
    fn anthropic_shape_is_exact_length() {
        let good = format!("sk-ant-api03-{}", "a".repeat(95));
        assert!(validate_key(ProviderTag::Anthropic, &good).is_ok());
        let short = format!("sk-ant-api03-{}", "a".repeat(94));
        assert!(validate_key(ProviderTag::Anthropic, &short).is_err());
    }

    #[test]
    fn gemini_mistral_grok_shapes() {
        assert!(validate_key(ProviderTag::Gemini, &key_of("AIza", 33)).is_ok());
        assert!(validate_key(ProviderTag::Gemini, &key_of("BIza", 33)).is_err());

        assert!(validate_key(ProviderTag::Mistral, &"a".repeat(32)).is_ok());
        assert!(validate_key(ProviderTag::Mistral, &"a".repeat(31)).is_err());
        assert!(validate_key(ProviderTag::Mistral, &"a".repeat(33)).is_err());

        assert!(validate_key(ProviderTag::Grok, &key_of("xai-", 40)).is_ok());
        assert!(validate_key(ProviderTag::Grok, &key_of("xai-", 39)).is_err());
    }

    #[test]
    fn openai_wire_vendors_share_shape() {
        for tag in [ProviderTag::Qwen, ProviderTag::Deepseek, ProviderTag::Kimi] {
            assert!(validate_key(tag, &key_of("sk-", 40)).is_ok());
            // The shared shape excludes dashes in the body, unlike openai.
            assert!(validate_key(tag, &key_of("sk-a_b-", 40)).is_err());
        }
    }

    #[test]
    fn empty_key_is_missing_not_invalid() {
        let err = validate_key(ProviderTag::Openai, "").unwrap_err();
        assert_eq!(err.code(), "MISSING_API_KEY");
        let err = validate_key(ProviderTag::Openai, "   ").unwrap_err();
        assert_eq!(err.code(), "MISSING_API_KEY");
    }

    #[test]
    fn mask_keeps_at_most_eight_chars() {
        let key = key_of("sk-", 48);
        let masked = mask(&key);
        assert_eq!(masked, "sk-a…aaaa");
        // No substring of the key longer than 4 chars survives.
        for window in key.as_bytes().windows(5) {
            let s = std::str::from_utf8(window).unwrap();
            assert!(!masked.contains(s), "mask leaked {s:?}");
        }
    }

    #[test]
    fn short_keys_mask_to_ellipsis() {
        assert_eq!(mask("sk-invalid"), "…");
        assert_eq!(mask(""), "…");
        assert_eq!(mask("elevenchars"), "…");
        assert_eq!(mask("twelve-chars"), "twel…hars");
    }

    #[test]
    fn validated_key_debug_is_masked() {
        let key = key_of("sk-", 48);
        let validated = validate_key(ProviderTag::Openai, &key).unwrap();
        let rendered = format!("{validated:?}");
        assert!(!rendered.contains(&key));
        assert!(rendered.contains("…"));
    }

    #[test]
    fn invalid_key_error_carries_masked_form_only() {
        let key = key_of("sk-", 20); // too short for openai
        let err = validate_key(ProviderTag::Openai, &key).unwrap_err();
        let rendered = err.to_string();
        assert!(!rendered.contains(&key));
        assert_eq!(err.code(), "INVALID_API_KEY");
    }
}
