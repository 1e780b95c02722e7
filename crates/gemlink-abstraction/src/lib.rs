//! Backend abstraction layer for gemlink.
//!
//! This module defines the core traits and types shared by the generation backends
//! and the request orchestrator.

use async_trait::async_trait;
use base64::Engine;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

/// Represents an error that can occur when talking to a generation backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// No API key was supplied.
    #[error("Missing API key")]
    MissingCredential,

    /// An error occurred while sending the request (e.g., network issues).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The backend answered with a non-success status.
    ///
    /// The body is kept verbatim; the backend embeds a JSON error document in it.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The response stream broke off after it started.
    #[error("Stream Error: {0}")]
    StreamError(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// Output kinds a generation call may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    /// Plain text output.
    Text,
    /// Inline image output.
    Image,
}

impl ResponseModality {
    /// Returns the modalities to request for the given mode.
    #[must_use]
    pub const fn for_mode(text_only: bool) -> &'static [Self] {
        if text_only { &[Self::Text] } else { &[Self::Text, Self::Image] }
    }
}

/// A single prompt submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The user prompt.
    pub prompt: String,
    /// Whether the caller wants an image back.
    pub image_intent: bool,
}

impl GenerationRequest {
    /// Creates a request for a text answer.
    #[must_use]
    pub fn text(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), image_intent: false }
    }

    /// Creates a request for an image answer.
    #[must_use]
    pub fn image(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), image_intent: true }
    }
}

/// One piece of generated content, as delivered by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentFragment {
    /// A text delta.
    Text(String),
    /// A base64-encoded binary part (usually an image slice).
    Binary {
        /// MIME type reported by the backend.
        mime_type: String,
        /// Base64 payload exactly as received.
        data: String,
    },
}

/// Listing entry for a backend-hosted model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, e.g. `models/gemini-2.5-flash`.
    pub name: String,
    /// Methods the model accepts, e.g. `generateContent`.
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// The bare model identifier without the `models/` prefix.
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    /// Whether the model can be used for content generation.
    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods.iter().any(|m| m == "generateContent")
    }
}

/// API credentials for the backend.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Wraps an API key. Surrounding whitespace is removed.
    #[must_use]
    pub fn new(api_key: impl AsRef<str>) -> Self {
        Self { api_key: api_key.as_ref().trim().to_string() }
    }

    /// Resolves credentials from the first non-blank value among `keys`,
    /// using `lookup` to read each one (normally `std::env::var`).
    pub fn from_lookup<F>(keys: &[&str], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        keys.iter()
            .filter_map(|key| lookup(key))
            .map(|value| Self::new(value))
            .find(Self::is_present)
            .unwrap_or_default()
    }

    /// Returns true when a non-blank key is available.
    pub fn is_present(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// The raw API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.is_present() { "<redacted>" } else { "<missing>" };
        f.debug_struct("Credentials").field("api_key", &shown).finish()
    }
}

/// The single value handed back to callers of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NormalizedResult {
    /// A text answer.
    Text {
        /// The generated text.
        value: String,
    },
    /// An image answer.
    Image {
        /// Base64 encoding of the image bytes.
        base64: String,
        /// MIME type of the image.
        mime_type: String,
    },
    /// A user-facing failure message.
    Error {
        /// Short, actionable message.
        message: String,
    },
}

impl NormalizedResult {
    /// Builds a text result.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { value: value.into() }
    }

    /// Builds an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Returns true for the `Error` variant.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Decodes the image payload, if this is an image result.
    pub fn decode_image(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        match self {
            Self::Image { base64, .. } => {
                Some(base64::engine::general_purpose::STANDARD.decode(base64))
            }
            _ => None,
        }
    }
}

/// Untagged view: the text, the error message, or the base64 payload.
impl fmt::Display for NormalizedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { value } => f.write_str(value),
            Self::Image { base64, .. } => f.write_str(base64),
            Self::Error { message } => f.write_str(message),
        }
    }
}

/// A boxed stream of content fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<ContentFragment, ModelError>> + Send>>;

/// A trait for content-generation backends.
///
/// Implementations must be `Send + Sync` so one backend can serve concurrent prompts.
/// Credentials are passed per call; backends hold no ambient key.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Lists the models visible to these credentials.
    ///
    /// # Errors
    /// Returns a `ModelError` if the listing call fails.
    async fn list_models(&self, credentials: &Credentials) -> Result<Vec<ModelInfo>, ModelError>;

    /// Starts a streamed generation call.
    ///
    /// Errors that happen before the first chunk are returned directly; errors after
    /// that arrive as items of the stream.
    ///
    /// # Errors
    /// Returns a `ModelError` if the call is rejected.
    async fn stream_content(
        &self,
        credentials: &Credentials,
        model: &str,
        prompt: &str,
        modalities: &[ResponseModality],
    ) -> Result<FragmentStream, ModelError>;

    /// Performs a single non-streamed generation call.
    ///
    /// # Errors
    /// Returns a `ModelError` if the call fails.
    async fn generate_content(
        &self,
        credentials: &Credentials,
        model: &str,
        prompt: &str,
        modalities: &[ResponseModality],
    ) -> Result<Vec<ContentFragment>, ModelError>;

    /// Short name of the backend, used in logs.
    fn name(&self) -> &str;
}
