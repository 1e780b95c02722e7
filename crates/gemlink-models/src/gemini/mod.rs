//! Google Gemini backend implementation.
//!
//! This module provides an implementation of the `GenerativeBackend` trait for the
//! Gemini REST API: streamed (`streamGenerateContent` over SSE) and batch
//! (`generateContent`) generation, plus model listing.

mod sse;

use async_trait::async_trait;
use futures::StreamExt;
use gemlink_abstraction::{
    ContentFragment, Credentials, FragmentStream, GenerativeBackend, ModelError, ModelInfo,
    ResponseModality,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use sse::SseFragmentStream;

/// Public endpoint of the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on listing pages followed through `nextPageToken`.
const MAX_LIST_PAGES: usize = 10;

/// Header carrying the API key. The key never goes into a URL.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    /// Creates a client for the public Gemini endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client for a custom endpoint (proxies, tests).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client: Client::new() }
    }

    /// The endpoint this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(prompt: &str, modalities: &[ResponseModality]) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: Some(prompt.to_string()), ..GeminiPart::default() }],
            }],
            generation_config: GeminiGenerationConfig { response_modalities: modalities.to_vec() },
        }
    }

    /// Sends a request with the key attached, stripping the URL from transport errors.
    async fn send(
        request: RequestBuilder,
        credentials: &Credentials,
        operation: &str,
    ) -> Result<Response, ModelError> {
        request.header(API_KEY_HEADER, credentials.api_key()).send().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, operation, "Failed to send request to Gemini API");
            ModelError::RequestError(format!("Network error: {}", e))
        })
    }

    /// Turns a non-success response into `ModelError::Api`, keeping the body verbatim.
    async fn check_status(response: Response, operation: &str) -> Result<Response, ModelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(
            status = %status,
            error = %body,
            operation,
            "Gemini API returned error status"
        );
        Err(ModelError::Api { status: status.as_u16(), body })
    }

    async fn post(
        &self,
        url: &str,
        credentials: &Credentials,
        prompt: &str,
        modalities: &[ResponseModality],
        operation: &str,
    ) -> Result<Response, ModelError> {
        let request_body = Self::build_request(prompt, modalities);
        let response = Self::send(self.client.post(url).json(&request_body), credentials, operation).await?;
        Self::check_status(response, operation).await
    }
}

/// Collects the fragments of the first candidate of a response chunk.
pub(crate) fn fragments_from_response(response: GeminiResponse) -> Vec<ContentFragment> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        warn!(block_reason = %reason, "Gemini blocked the prompt");
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Vec::new();
    };

    candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|part| !part.thought.unwrap_or(false))
        .filter_map(|part| {
            if let Some(inline) = part.inline_data {
                return Some(ContentFragment::Binary { mime_type: inline.mime_type, data: inline.data });
            }
            part.text.filter(|text| !text.is_empty()).map(ContentFragment::Text)
        })
        .collect()
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn list_models(&self, credentials: &Credentials) -> Result<Vec<ModelInfo>, ModelError> {
        if !credentials.is_present() {
            return Err(ModelError::MissingCredential);
        }

        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut request = self.client.get(format!("{}/models", self.base_url));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = Self::send(request, credentials, "list_models").await?;
            let response = Self::check_status(response, "list_models").await?;

            let page: GeminiModelList = response.json().await.map_err(|e| {
                let e = e.without_url();
                error!(error = %e, "Failed to parse Gemini model listing");
                ModelError::SerializationError(format!("Failed to parse model list: {}", e))
            })?;

            models.extend(page.models);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = models.len(), "Gemini model listing received");
        Ok(models)
    }

    async fn stream_content(
        &self,
        credentials: &Credentials,
        model: &str,
        prompt: &str,
        modalities: &[ResponseModality],
    ) -> Result<FragmentStream, ModelError> {
        if !credentials.is_present() {
            return Err(ModelError::MissingCredential);
        }

        debug!(
            model_id = %model,
            prompt_len = prompt.len(),
            modalities = ?modalities,
            "Gemini streaming generation"
        );

        let url = format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, model);
        let response = self.post(&url, credentials, prompt, modalities, "stream_content").await?;

        let bytes = response.bytes_stream().map(|chunk| chunk.map_err(reqwest::Error::without_url));
        Ok(Box::pin(SseFragmentStream::new(bytes)))
    }

    async fn generate_content(
        &self,
        credentials: &Credentials,
        model: &str,
        prompt: &str,
        modalities: &[ResponseModality],
    ) -> Result<Vec<ContentFragment>, ModelError> {
        if !credentials.is_present() {
            return Err(ModelError::MissingCredential);
        }

        debug!(
            model_id = %model,
            prompt_len = prompt.len(),
            modalities = ?modalities,
            "Gemini batch generation"
        );

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self.post(&url, credentials, prompt, modalities, "generate_content").await?;

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, "Failed to parse Gemini API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        Ok(fragments_from_response(gemini_response))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_modalities: Vec<ResponseModality>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiInlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}
