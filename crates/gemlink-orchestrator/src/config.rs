//! Orchestrator configuration.

use crate::error::{OrchestrationError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A model in the static preference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPreference {
    /// Model id, e.g. `gemini-2.5-flash`.
    pub id: String,
    /// Whether the model can return images.
    #[serde(default)]
    pub supports_image: bool,
}

impl ModelPreference {
    /// A text-only model.
    pub fn text(id: &str) -> Self {
        Self { id: id.to_string(), supports_image: false }
    }

    /// A model that can return images.
    pub fn image(id: &str) -> Self {
        Self { id: id.to_string(), supports_image: true }
    }
}

/// Retry, backoff and candidate settings for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Attempts per model before falling back (rate-limit retries count, modality
    /// downgrades do not).
    pub max_attempts_per_model: u32,
    /// Delay used when the server gives no usable retry hint.
    pub default_retry_delay_secs: u64,
    /// Smallest server retry hint that is honoured.
    pub min_retry_delay_secs: u64,
    /// Largest server retry hint that is honoured.
    pub max_retry_delay_secs: u64,
    /// Pause between two candidate models. Zero disables it.
    pub inter_model_delay_ms: u64,
    /// Try a batch call against a model whose streamed call reported not-found.
    pub non_streaming_fallback: bool,
    /// Ask the backend which models are available before choosing candidates.
    pub discover_models: bool,
    /// Candidate models, most preferred first.
    pub preferred_models: Vec<ModelPreference>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_model: 2,
            default_retry_delay_secs: 5,
            min_retry_delay_secs: 1,
            max_retry_delay_secs: 30,
            inter_model_delay_ms: 2000,
            non_streaming_fallback: true,
            discover_models: true,
            preferred_models: default_preferred_models(),
        }
    }
}

/// The built-in preference list.
pub fn default_preferred_models() -> Vec<ModelPreference> {
    vec![
        ModelPreference::text("gemini-2.5-flash"),
        ModelPreference::text("gemini-2.5-pro"),
        ModelPreference::text("gemini-2.0-flash"),
        ModelPreference::image("gemini-2.0-flash-exp"),
        ModelPreference::text("gemini-exp-1206"),
        ModelPreference::text("gemini-flash-latest"),
        ModelPreference::text("gemini-1.5-flash"),
        ModelPreference::text("gemini-1.5-pro"),
        ModelPreference::image("gemini-2.5-flash-image"),
        ModelPreference::image("gemini-2.0-flash-preview-image-generation"),
    ]
}

impl OrchestratorConfig {
    /// Checks the settings for values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts_per_model == 0 {
            return Err(OrchestrationError::InvalidConfig(
                "max_attempts_per_model must be at least 1".to_string(),
            ));
        }
        if self.min_retry_delay_secs > self.max_retry_delay_secs {
            return Err(OrchestrationError::InvalidConfig(format!(
                "min_retry_delay_secs ({}) is greater than max_retry_delay_secs ({})",
                self.min_retry_delay_secs, self.max_retry_delay_secs
            )));
        }
        if self.preferred_models.is_empty() {
            return Err(OrchestrationError::InvalidConfig(
                "preferred_models must not be empty".to_string(),
            ));
        }
        if let Some(blank) = self.preferred_models.iter().find(|m| m.id.trim().is_empty()) {
            return Err(OrchestrationError::InvalidConfig(format!(
                "preferred model id must not be blank: {:?}",
                blank
            )));
        }
        Ok(())
    }

    /// How long to wait before retrying a rate-limited model.
    ///
    /// Hints outside `[min_retry_delay_secs, max_retry_delay_secs]` are ignored in
    /// favour of the default.
    pub fn retry_delay(&self, hint_secs: Option<u64>) -> Duration {
        match hint_secs {
            Some(secs) if (self.min_retry_delay_secs..=self.max_retry_delay_secs).contains(&secs) => {
                Duration::from_secs(secs)
            }
            _ => Duration::from_secs(self.default_retry_delay_secs),
        }
    }

    /// Pause inserted between candidate models.
    pub fn inter_model_delay(&self) -> Duration {
        Duration::from_millis(self.inter_model_delay_ms)
    }

    /// Preferred model ids usable for a request, in preference order.
    pub fn preferred_ids(&self, image_intent: bool) -> Vec<String> {
        self.preferred_models
            .iter()
            .filter(|m| !image_intent || m.supports_image)
            .map(|m| m.id.clone())
            .collect()
    }
}
