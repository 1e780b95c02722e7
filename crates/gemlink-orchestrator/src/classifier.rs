//! Failure classification.
//!
//! The backend tends to embed a JSON error document inside free-text error messages
//! (`API error (429): {"error": {...}}`). All knowledge of that convention lives here;
//! the rest of the orchestrator only sees `ClassifiedError`.

use crate::error::OrchestrationError;
use gemlink_abstraction::ModelError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// Retry-delay patterns compiled lazily
static RETRY_DELAY_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+)(?:\.\d+)?s""#).expect("retryDelay regex should be valid")
});

static RETRY_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry in (\d+)(?:\.\d+)?s\b").expect("retry-in regex should be valid")
});

/// What kind of failure a backend call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// 429 / quota exhausted; retry after a delay.
    RateLimited,
    /// The model does not exist or cannot serve this method.
    NotFound,
    /// The model rejected the requested output modalities.
    UnsupportedModality,
    /// Anything else.
    Transient,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::UnsupportedModality => "unsupported_modality",
            Self::Transient => "transient",
        };
        f.write_str(label)
    }
}

/// Structured verdict about one failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Failure kind.
    pub category: ErrorCategory,
    /// Best available human-readable message (backend message or raw text).
    pub message: String,
    /// Numeric code from the payload or the HTTP status.
    pub code: Option<u16>,
    /// Machine-readable status token, e.g. `NOT_FOUND`.
    pub status: Option<String>,
    /// Server-suggested retry delay in whole seconds.
    pub retry_after_seconds: Option<u64>,
}

impl ClassifiedError {
    /// A transient failure with only a message.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Transient,
            message: message.into(),
            code: None,
            status: None,
            retry_after_seconds: None,
        }
    }
}

/// Classifies a backend error. Never fails; unparseable input is `Transient`.
pub fn classify(error: &ModelError) -> ClassifiedError {
    let http_status = match error {
        ModelError::Api { status, .. } => Some(*status),
        _ => None,
    };
    classify_text(&error.to_string(), http_status)
}

/// Classifies any orchestration failure.
pub fn classify_failure(error: &OrchestrationError) -> ClassifiedError {
    match error {
        OrchestrationError::Model(model_error) => classify(model_error),
        other => ClassifiedError::transient(other.to_string()),
    }
}

fn classify_text(raw: &str, http_status: Option<u16>) -> ClassifiedError {
    let payload = extract_payload(raw);
    let body = payload.as_ref().map(|p| p.get("error").unwrap_or(p));

    let payload_code = body
        .and_then(|b| b.get("code"))
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok());
    let code = payload_code.or(http_status);
    let status = body
        .and_then(|b| b.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = body
        .and_then(|b| b.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| raw.to_string(), str::to_string);

    let status_is = |token: &str| status.as_deref() == Some(token);
    let lowered = message.to_lowercase();

    let category = if code == Some(429) || status_is("RESOURCE_EXHAUSTED") {
        ErrorCategory::RateLimited
    } else if mentions_text_only(&lowered) && matches!(code, Some(400) | None) {
        ErrorCategory::UnsupportedModality
    } else if code == Some(404)
        || status_is("NOT_FOUND")
        || lowered.contains("not found")
        || lowered.contains("not supported")
    {
        ErrorCategory::NotFound
    } else {
        ErrorCategory::Transient
    };

    let retry_after_seconds = if category == ErrorCategory::RateLimited {
        retry_delay_secs(raw)
    } else {
        None
    };

    ClassifiedError { category, message, code, status, retry_after_seconds }
}

fn mentions_text_only(lowered: &str) -> bool {
    lowered.contains("only supports text output")
        || lowered.contains("does not support the requested response modalities")
}

/// Finds the outermost `{ ... }` span in `raw` and parses it as JSON.
fn extract_payload(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&raw[start..=end]).ok().filter(Value::is_object)
}

/// Reads a `"retryDelay": "<n>[.<m>]s"` field, or a "retry in <n>s" phrase.
/// Values that do not fit in a `u64` yield `None`.
fn retry_delay_secs(raw: &str) -> Option<u64> {
    RETRY_DELAY_FIELD
        .captures(raw)
        .or_else(|| RETRY_IN_TEXT.captures(raw))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, body: &str) -> ModelError {
        ModelError::Api { status, body: body.to_string() }
    }

    #[test]
    fn test_rate_limited_with_retry_delay() {
        let body = r#"{"error":{"code":429,"message":"You exceeded your current quota. Please retry in 3.37s.","status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"3s"}]}}"#;
        let c = classify(&api(429, body));
        assert_eq!(c.category, ErrorCategory::RateLimited);
        assert_eq!(c.retry_after_seconds, Some(3));
        assert_eq!(c.code, Some(429));
        assert_eq!(c.status.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert!(c.message.starts_with("You exceeded"));
    }

    #[test]
    fn test_fractional_retry_delay_truncates() {
        let c = classify(&api(429, r#"{"error":{"code":429,"details":[{"retryDelay":"12.75s"}]}}"#));
        assert_eq!(c.retry_after_seconds, Some(12));
    }

    #[test]
    fn test_retry_hint_from_message_text() {
        let c = classify(&ModelError::Other("429 Too Many Requests: please retry in 7s".to_string()));
        // No payload and no HTTP status: the plain message is not a 429 code.
        assert_eq!(c.category, ErrorCategory::Transient);

        let c = classify(&api(429, "quota exceeded, retry in 7s"));
        assert_eq!(c.category, ErrorCategory::RateLimited);
        assert_eq!(c.retry_after_seconds, Some(7));
    }

    #[test]
    fn test_huge_retry_delay_is_dropped() {
        let c = classify(&api(429, r#"{"error":{"code":429,"details":[{"retryDelay":"99999999999999999999999s"}]}}"#));
        assert_eq!(c.category, ErrorCategory::RateLimited);
        assert_eq!(c.retry_after_seconds, None);
    }

    #[test]
    fn test_rate_limited_without_delay() {
        let c = classify(&api(429, "Too Many Requests"));
        assert_eq!(c.category, ErrorCategory::RateLimited);
        assert_eq!(c.retry_after_seconds, None);
        assert_eq!(c.message, "API error (429): Too Many Requests");
    }

    #[test]
    fn test_not_found_variants() {
        let by_code = classify(&api(404, r#"{"error":{"code":404,"message":"models/x is gone","status":"NOT_FOUND"}}"#));
        assert_eq!(by_code.category, ErrorCategory::NotFound);

        let by_status = classify(&ModelError::StreamError(r#"{"error":{"status":"NOT_FOUND"}}"#.to_string()));
        assert_eq!(by_status.category, ErrorCategory::NotFound);

        let by_text = classify(&ModelError::Other("Method generateContent is NOT SUPPORTED here".to_string()));
        assert_eq!(by_text.category, ErrorCategory::NotFound);

        let by_text = classify(&ModelError::RequestError("model Not Found".to_string()));
        assert_eq!(by_text.category, ErrorCategory::NotFound);
    }

    #[test]
    fn test_unsupported_modality() {
        let body = r#"{"error":{"code":400,"message":"This model only supports text output.","status":"INVALID_ARGUMENT"}}"#;
        let c = classify(&api(400, body));
        assert_eq!(c.category, ErrorCategory::UnsupportedModality);
        assert_eq!(c.message, "This model only supports text output.");

        let plain = classify(&ModelError::Other("Model ONLY SUPPORTS TEXT OUTPUT".to_string()));
        assert_eq!(plain.category, ErrorCategory::UnsupportedModality);

        let modalities = classify(&api(
            400,
            r#"{"error":{"code":400,"message":"Model does not support the requested response modalities: image"}}"#,
        ));
        assert_eq!(modalities.category, ErrorCategory::UnsupportedModality);
    }

    #[test]
    fn test_text_only_message_with_other_code_is_not_modality() {
        let c = classify(&api(500, r#"{"error":{"code":500,"message":"only supports text output"}}"#));
        assert_eq!(c.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_transient_fallbacks() {
        let overloaded = classify(&api(503, r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#));
        assert_eq!(overloaded.category, ErrorCategory::Transient);
        assert_eq!(overloaded.code, Some(503));

        let network = classify(&ModelError::RequestError("Network error: connection refused".to_string()));
        assert_eq!(network.category, ErrorCategory::Transient);
        assert_eq!(network.message, "Request Error: Network error: connection refused");
        assert_eq!(network.code, None);

        let broken = classify(&api(500, "{not json at all}"));
        assert_eq!(broken.category, ErrorCategory::Transient);
        assert_eq!(broken.code, Some(500));
    }

    #[test]
    fn test_payload_code_beats_http_status() {
        let c = classify(&api(500, r#"{"error":{"code":429}}"#));
        assert_eq!(c.category, ErrorCategory::RateLimited);
        assert_eq!(c.code, Some(429));
    }

    #[test]
    fn test_decode_failures_are_transient() {
        let err = OrchestrationError::InvalidConfig("x".to_string());
        assert_eq!(classify_failure(&err).category, ErrorCategory::Transient);

        let wrapped = OrchestrationError::from(api(404, "gone"));
        assert_eq!(classify_failure(&wrapped).category, ErrorCategory::NotFound);
    }
}
