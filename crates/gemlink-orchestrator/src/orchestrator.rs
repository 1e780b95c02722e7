//! Request orchestration: candidate selection, retry, downgrade and fallback.

use crate::candidates::CandidateQueue;
use crate::classifier::{ClassifiedError, ErrorCategory, classify_failure};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::normalizer::{AttemptOutcome, EncodedImage, normalize};
use crate::reassembler::BinaryReassembler;
use futures::StreamExt;
use gemlink_abstraction::{
    ContentFragment, Credentials, GenerationRequest, GenerativeBackend, NormalizedResult,
    ResponseModality,
};
use gemlink_models::{CachedCatalog, CatalogResolver, ModelCatalog};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// MIME type assumed when the backend sends binary data without one.
const DEFAULT_IMAGE_MIME: &str = "image/png";

/// How a model's turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOutcome {
    /// The model produced the result.
    Succeeded,
    /// The model was abandoned after a failure of this category.
    Failed(ErrorCategory),
}

/// Record of one candidate model's turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt {
    /// Model id.
    pub model: String,
    /// Attempts consumed against the per-model budget.
    pub attempts_made: u32,
    /// Whether the final call ran in text-only mode.
    pub text_only: bool,
    /// Whether the model was downgraded to text-only after rejecting images.
    pub downgraded: bool,
    /// Whether the non-streaming fallback call was used.
    pub used_batch_fallback: bool,
    /// How the turn ended.
    pub outcome: ModelOutcome,
}

impl ModelAttempt {
    fn new(model: &str, text_only: bool) -> Self {
        Self {
            model: model.to_string(),
            attempts_made: 0,
            text_only,
            downgraded: false,
            used_batch_fallback: false,
            outcome: ModelOutcome::Failed(ErrorCategory::Transient),
        }
    }
}

/// The normalized result of a run plus the per-model attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    /// The caller-facing result.
    pub result: NormalizedResult,
    /// Every model tried, in order.
    pub attempts: Vec<ModelAttempt>,
}

impl GenerationReport {
    /// The model that produced the result, if any did.
    pub fn succeeded_model(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.outcome == ModelOutcome::Succeeded)
            .map(|a| a.model.as_str())
    }
}

/// Output collected during a single call. Discarded when the call fails.
#[derive(Debug, Default)]
struct AttemptState {
    text: String,
    binary: BinaryReassembler,
}

impl AttemptState {
    fn absorb(&mut self, fragment: ContentFragment) -> Result<()> {
        match fragment {
            ContentFragment::Text(text) => self.text.push_str(&text),
            ContentFragment::Binary { mime_type, data } => {
                if !data.is_empty() {
                    self.binary.append_base64(&mime_type, &data)?;
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> AttemptOutcome {
        let image = if self.binary.is_empty() {
            None
        } else {
            let mime_type = self.binary.mime_type().unwrap_or(DEFAULT_IMAGE_MIME).to_string();
            Some(EncodedImage { base64: self.binary.finalize(), mime_type })
        };
        AttemptOutcome::Completed { text: self.text, image }
    }
}

/// Chooses models, calls the backend and folds every outcome into a
/// [`NormalizedResult`].
///
/// `generate` takes `&self`, so one orchestrator can serve concurrent prompts; all
/// per-request state lives on the call stack.
pub struct Orchestrator {
    backend: Arc<dyn GenerativeBackend>,
    catalog: Arc<dyn ModelCatalog>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with a cached catalog over the same backend.
    pub fn new(backend: Arc<dyn GenerativeBackend>, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(CachedCatalog::new(CatalogResolver::new(Arc::clone(&backend))));
        Ok(Self { backend, catalog, config })
    }

    /// Replaces the model catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn ModelCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The models a request would try, in order, including the discovery fallback.
    pub async fn candidates(&self, image_intent: bool, credentials: &Credentials) -> Vec<String> {
        let (queue, discovered) = self.plan(image_intent, credentials).await;
        let mut models: Vec<String> = queue.pending().map(str::to_string).collect();
        if let Some(extra) = discovered.iter().find(|m| !queue.contains(m)) {
            models.push(extra.clone());
        }
        models
    }

    /// Runs a request to completion. Never fails; errors come back as
    /// `NormalizedResult::Error`.
    pub async fn generate(&self, request: &GenerationRequest, credentials: &Credentials) -> NormalizedResult {
        self.generate_with_report(request, credentials).await.result
    }

    /// Like [`generate`](Self::generate), also returning what each model did.
    pub async fn generate_with_report(
        &self,
        request: &GenerationRequest,
        credentials: &Credentials,
    ) -> GenerationReport {
        if !credentials.is_present() {
            warn!("No API key configured, skipping generation");
            return GenerationReport { result: normalize(AttemptOutcome::MissingCredential), attempts: Vec::new() };
        }

        let (mut queue, discovered) = self.plan(request.image_intent, credentials).await;
        debug!(
            image_intent = request.image_intent,
            candidates = ?queue.pending().collect::<Vec<_>>(),
            "Candidate models selected"
        );

        let mut attempts = Vec::new();
        let mut categories = Vec::new();
        let mut discovery_fallback_used = false;

        loop {
            let Some(model) = queue.next_model() else {
                if discovery_fallback_used {
                    break;
                }
                discovery_fallback_used = true;
                match discovered.iter().find(|m| !queue.contains(m)) {
                    Some(extra) => {
                        info!(model = %extra, "Falling back to first available model");
                        queue.push(extra.clone());
                        continue;
                    }
                    None => break,
                }
            };

            let (attempt, completed) = self.run_model(&model, request, credentials).await;
            if let ModelOutcome::Failed(category) = attempt.outcome {
                categories.push(category);
            }
            attempts.push(attempt);

            if let Some(outcome) = completed {
                info!(model = %model, "Generation succeeded");
                return GenerationReport { result: normalize(outcome), attempts };
            }

            let delay = self.config.inter_model_delay();
            if !queue.is_empty() && !delay.is_zero() {
                debug!(delay_ms = self.config.inter_model_delay_ms, "Pausing before next model");
                tokio::time::sleep(delay).await;
            }
        }

        let attempted = queue.attempted().to_vec();
        if attempted.is_empty() {
            warn!(image_intent = request.image_intent, "No candidate models for request");
            return GenerationReport { result: normalize(AttemptOutcome::NoCandidates), attempts };
        }

        error!(models = ?attempted, categories = ?categories, "All models failed");
        GenerationReport { result: normalize(AttemptOutcome::Exhausted { attempted, categories }), attempts }
    }

    /// Builds the candidate queue and returns it with the discovered model list.
    async fn plan(&self, image_intent: bool, credentials: &Credentials) -> (CandidateQueue, Vec<String>) {
        let preferred = self.config.preferred_ids(image_intent);
        let discovered = if self.config.discover_models && credentials.is_present() {
            self.catalog.resolve(credentials).await
        } else {
            Vec::new()
        };

        if discovered.is_empty() {
            return (CandidateQueue::new(preferred), discovered);
        }

        let available: HashSet<&str> = discovered.iter().map(String::as_str).collect();
        let queue = CandidateQueue::new(preferred.into_iter().filter(|id| available.contains(id.as_str())));
        (queue, discovered)
    }

    /// Gives one model its full turn. Returns the outcome if it succeeded.
    async fn run_model(
        &self,
        model: &str,
        request: &GenerationRequest,
        credentials: &Credentials,
    ) -> (ModelAttempt, Option<AttemptOutcome>) {
        let mut attempt = ModelAttempt::new(model, !request.image_intent);

        loop {
            info!(
                model = %model,
                attempt = attempt.attempts_made + 1,
                text_only = attempt.text_only,
                "Trying model"
            );

            let failure = match self.stream_once(model, &request.prompt, attempt.text_only, credentials).await {
                Ok(outcome) => {
                    attempt.outcome = ModelOutcome::Succeeded;
                    return (attempt, Some(outcome));
                }
                Err(e) => classify_failure(&e),
            };
            debug!(model = %model, category = ?failure.category, raw = %failure.message, "Model call failed");

            match failure.category {
                ErrorCategory::UnsupportedModality if !attempt.text_only => {
                    warn!(model = %model, "Model rejected image output, retrying text-only");
                    attempt.text_only = true;
                    attempt.downgraded = true;
                }
                ErrorCategory::RateLimited => {
                    attempt.attempts_made += 1;
                    if attempt.attempts_made >= self.config.max_attempts_per_model {
                        warn!(model = %model, attempts = attempt.attempts_made, "Rate limited, attempts exhausted");
                        attempt.outcome = ModelOutcome::Failed(ErrorCategory::RateLimited);
                        return (attempt, None);
                    }
                    let delay = self.config.retry_delay(failure.retry_after_seconds);
                    warn!(
                        model = %model,
                        attempt = attempt.attempts_made,
                        delay_secs = delay.as_secs(),
                        "Rate limited, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
                ErrorCategory::NotFound => {
                    warn!(model = %model, "Model not found");
                    if !self.config.non_streaming_fallback {
                        attempt.outcome = ModelOutcome::Failed(ErrorCategory::NotFound);
                        return (attempt, None);
                    }
                    attempt.used_batch_fallback = true;
                    return match self.batch_fallback(model, &request.prompt, &mut attempt, credentials).await {
                        Ok(outcome) => {
                            attempt.outcome = ModelOutcome::Succeeded;
                            (attempt, Some(outcome))
                        }
                        Err(batch_failure) => {
                            warn!(model = %model, category = ?batch_failure.category, "Non-streaming fallback failed");
                            attempt.outcome = ModelOutcome::Failed(batch_failure.category);
                            (attempt, None)
                        }
                    };
                }
                category => {
                    attempt.attempts_made += 1;
                    warn!(model = %model, category = ?category, "Model failed, moving to next model");
                    attempt.outcome = ModelOutcome::Failed(category);
                    return (attempt, None);
                }
            }
        }
    }

    /// One batch call against a model whose streamed call reported not-found, with
    /// the same one-time text-only downgrade as the streamed path.
    async fn batch_fallback(
        &self,
        model: &str,
        prompt: &str,
        attempt: &mut ModelAttempt,
        credentials: &Credentials,
    ) -> std::result::Result<AttemptOutcome, ClassifiedError> {
        loop {
            info!(model = %model, text_only = attempt.text_only, "Trying non-streaming call");
            match self.batch_once(model, prompt, attempt.text_only, credentials).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    let failure = classify_failure(&e);
                    if failure.category == ErrorCategory::UnsupportedModality && !attempt.text_only {
                        warn!(model = %model, "Model rejected image output, retrying text-only");
                        attempt.text_only = true;
                        attempt.downgraded = true;
                        continue;
                    }
                    return Err(failure);
                }
            }
        }
    }

    async fn stream_once(
        &self,
        model: &str,
        prompt: &str,
        text_only: bool,
        credentials: &Credentials,
    ) -> Result<AttemptOutcome> {
        let modalities = ResponseModality::for_mode(text_only);
        let mut stream = self.backend.stream_content(credentials, model, prompt, modalities).await?;

        let mut state = AttemptState::default();
        while let Some(fragment) = stream.next().await {
            state.absorb(fragment?)?;
        }
        Ok(state.finish())
    }

    async fn batch_once(
        &self,
        model: &str,
        prompt: &str,
        text_only: bool,
        credentials: &Credentials,
    ) -> Result<AttemptOutcome> {
        let modalities = ResponseModality::for_mode(text_only);
        let fragments = self.backend.generate_content(credentials, model, prompt, modalities).await?;

        let mut state = AttemptState::default();
        for fragment in fragments {
            state.absorb(fragment)?;
        }
        Ok(state.finish())
    }
}
