//! Result normalization.
//!
//! Maps the orchestrator's raw outcome to the caller-facing [`NormalizedResult`].
//! Backend error bodies never pass through here; failures become canned messages.

use crate::classifier::ErrorCategory;
use gemlink_abstraction::NormalizedResult;

/// Message returned for a successful call that produced neither text nor image.
pub const NO_CONTENT_MESSAGE: &str = "No content generated.";

/// Message returned when no API key is configured.
pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "Missing API key. Set GEMINI_API_KEY (or GOOGLE_AI_API_KEY) or add api_key to your gemlink config.";

/// Message returned when no model can serve the request at all.
pub const NO_CANDIDATES_MESSAGE: &str =
    "No models are available for this request. Check the preferred_models setting.";

/// An image produced by a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 encoding of the image bytes.
    pub base64: String,
    /// MIME type reported by the backend.
    pub mime_type: String,
}

/// How an orchestration run ended, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A model answered.
    Completed {
        /// Accumulated text (may be empty).
        text: String,
        /// Reassembled image, if any binary arrived.
        image: Option<EncodedImage>,
    },
    /// No credentials were supplied.
    MissingCredential,
    /// The candidate list was empty.
    NoCandidates,
    /// Every candidate failed.
    Exhausted {
        /// Models tried, in attempt order.
        attempted: Vec<String>,
        /// Final failure category of each attempted model.
        categories: Vec<ErrorCategory>,
    },
}

/// Converts an outcome into the caller-facing result.
pub fn normalize(outcome: AttemptOutcome) -> NormalizedResult {
    match outcome {
        AttemptOutcome::Completed { image: Some(image), .. } => NormalizedResult::Image {
            base64: image.base64,
            mime_type: image.mime_type,
        },
        AttemptOutcome::Completed { text, image: None } => {
            if text.is_empty() {
                NormalizedResult::text(NO_CONTENT_MESSAGE)
            } else {
                NormalizedResult::text(text)
            }
        }
        AttemptOutcome::MissingCredential => NormalizedResult::error(MISSING_CREDENTIAL_MESSAGE),
        AttemptOutcome::NoCandidates => NormalizedResult::error(NO_CANDIDATES_MESSAGE),
        AttemptOutcome::Exhausted { attempted, categories } => {
            NormalizedResult::error(exhaustion_message(&attempted, &categories))
        }
    }
}

/// Canned guidance for a failure category.
pub const fn user_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::RateLimited => "Rate limits detected (429): wait a few minutes and try again",
        ErrorCategory::NotFound => "Some models are not available for this API key or API version",
        ErrorCategory::UnsupportedModality => "Some models cannot return images; try a text prompt",
        ErrorCategory::Transient => "Models may be overloaded (503) or unreachable: try again shortly",
    }
}

fn exhaustion_message(attempted: &[String], categories: &[ErrorCategory]) -> String {
    let mut message = format!("All models failed (tried: {}).\n", attempted.join(", "));

    let mut seen: Vec<ErrorCategory> = Vec::new();
    for category in categories {
        if !seen.contains(category) {
            seen.push(*category);
        }
    }
    seen.sort();

    message.push_str("\nNext steps:\n");
    for category in seen {
        message.push_str("  - ");
        message.push_str(user_message(category));
        message.push('\n');
    }
    message.push_str("  - Check your API key and quota in Google AI Studio");
    message
}
