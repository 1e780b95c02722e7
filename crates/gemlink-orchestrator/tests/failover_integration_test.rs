//! Integration tests for retry, downgrade and fallback across models.

use async_trait::async_trait;
use gemlink_abstraction::{
    ContentFragment, Credentials, GenerationRequest, GenerativeBackend, ModelError, NormalizedResult,
    ResponseModality,
};
use gemlink_models::{CallKind, ModelCatalog, ScriptedBackend, ScriptedReply};
use gemlink_orchestrator::{
    ErrorCategory, ModelOutcome, ModelPreference, Orchestrator, OrchestratorConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn config(models: &[&str]) -> OrchestratorConfig {
    OrchestratorConfig {
        inter_model_delay_ms: 0,
        discover_models: false,
        preferred_models: models.iter().map(|m| ModelPreference::image(m)).collect(),
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(backend: &Arc<ScriptedBackend>, config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::new(Arc::clone(backend) as Arc<dyn GenerativeBackend>, config).unwrap()
}

fn rate_limited(retry_delay: &str) -> ScriptedReply {
    ScriptedReply::status(
        429,
        format!(
            r#"{{"error":{{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED","details":[{{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"{retry_delay}"}}]}}}}"#
        ),
    )
}

fn unavailable() -> ScriptedReply {
    ScriptedReply::status(503, r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#)
}

fn creds() -> Credentials {
    Credentials::new("test-key")
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retries_after_server_delay() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", rate_limited("3s"))
            .on_stream("alpha", ScriptedReply::text("after the wait")),
    );
    let orch = orchestrator(&backend, config(&["alpha", "beta"]));

    let start = Instant::now();
    let report = orch.generate_with_report(&GenerationRequest::text("hi"), &creds()).await;
    let elapsed = start.elapsed();

    assert_eq!(report.result, NormalizedResult::text("after the wait"));
    assert!(elapsed >= Duration::from_secs(3), "slept {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "slept {elapsed:?}");
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].attempts_made, 1);
    assert_eq!(backend.called_models(), vec!["alpha", "alpha"]);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_retry_delay_uses_default() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", rate_limited("99999999999s"))
            .on_stream("alpha", ScriptedReply::text("ok")),
    );
    let orch = orchestrator(&backend, config(&["alpha"]));

    let start = Instant::now();
    let result = orch.generate(&GenerationRequest::text("hi"), &creds()).await;
    let elapsed = start.elapsed();

    assert_eq!(result, NormalizedResult::text("ok"));
    assert!(elapsed >= Duration::from_secs(5), "slept {elapsed:?}");
    assert!(elapsed < Duration::from_secs(30), "slept {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_retry_delay_uses_default() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", rate_limited("soon"))
            .on_stream("alpha", ScriptedReply::text("ok")),
    );
    let orch = orchestrator(&backend, config(&["alpha"]));

    let start = Instant::now();
    let result = orch.generate(&GenerationRequest::text("hi"), &creds()).await;

    assert_eq!(result, NormalizedResult::text("ok"));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6), "slept {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhaustion_moves_to_next_model() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", rate_limited("2s"))
            .on_stream("alpha", rate_limited("2s"))
            .on_stream("alpha", ScriptedReply::text("never reached"))
            .on_stream("beta", ScriptedReply::text("from beta")),
    );
    let orch = orchestrator(&backend, config(&["alpha", "beta"]));

    let start = Instant::now();
    let report = orch.generate_with_report(&GenerationRequest::text("hi"), &creds()).await;

    assert_eq!(report.result, NormalizedResult::text("from beta"));
    assert_eq!(backend.called_models(), vec!["alpha", "alpha", "beta"]);
    assert_eq!(report.attempts[0].attempts_made, 2);
    assert_eq!(report.attempts[0].outcome, ModelOutcome::Failed(ErrorCategory::RateLimited));
    // One retry sleep; the second 429 exhausts the budget without sleeping.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(4), "slept {elapsed:?}");
}

#[tokio::test]
async fn test_not_found_skips_model_without_consuming_attempts_or_leaking_text() {
    let not_found = ModelError::Api {
        status: 404,
        body: r#"{"error":{"code":404,"message":"models/alpha is not found","status":"NOT_FOUND"}}"#.to_string(),
    };
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream(
                "alpha",
                ScriptedReply::FailMidStream {
                    fragments: vec![ContentFragment::Text("stale text from alpha".to_string())],
                    error: not_found.clone(),
                },
            )
            .on_generate("alpha", ScriptedReply::Fail(not_found))
            .on_stream("beta", ScriptedReply::text("fresh")),
    );
    let orch = orchestrator(&backend, config(&["alpha", "beta"]));

    let report = orch.generate_with_report(&GenerationRequest::text("hi"), &creds()).await;

    assert_eq!(report.result, NormalizedResult::text("fresh"));
    let alpha = &report.attempts[0];
    assert_eq!(alpha.attempts_made, 0);
    assert!(alpha.used_batch_fallback);
    assert_eq!(alpha.outcome, ModelOutcome::Failed(ErrorCategory::NotFound));

    let calls: Vec<_> = backend.calls().into_iter().map(|c| (c.model, c.kind)).collect();
    assert_eq!(
        calls,
        vec![
            ("alpha".to_string(), CallKind::Streamed),
            ("alpha".to_string(), CallKind::Batch),
            ("beta".to_string(), CallKind::Streamed),
        ]
    );
}

#[tokio::test]
async fn test_unsupported_modality_downgrades_without_consuming_attempt() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream(
                "alpha",
                ScriptedReply::status(
                    400,
                    r#"{"error":{"code":400,"message":"This model only supports text output.","status":"INVALID_ARGUMENT"}}"#,
                ),
            )
            .on_stream("alpha", ScriptedReply::text("I can only describe it")),
    );
    let orch = orchestrator(&backend, config(&["alpha"]));

    let report = orch.generate_with_report(&GenerationRequest::image("draw a cat"), &creds()).await;

    assert_eq!(report.result, NormalizedResult::text("I can only describe it"));
    let alpha = &report.attempts[0];
    assert_eq!(alpha.attempts_made, 0);
    assert!(alpha.downgraded);
    assert!(alpha.text_only);

    let calls = backend.calls();
    assert_eq!(calls[0].modalities, vec![ResponseModality::Text, ResponseModality::Image]);
    assert_eq!(calls[1].modalities, vec![ResponseModality::Text]);
}

#[tokio::test]
async fn test_all_transient_failures_list_each_model_once_in_order() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", unavailable())
            .on_stream("beta", unavailable())
            .on_stream("gamma", unavailable()),
    );
    let orch = orchestrator(&backend, config(&["alpha", "beta", "gamma"]));

    let report = orch.generate_with_report(&GenerationRequest::text("hi"), &creds()).await;
    let message = match &report.result {
        NormalizedResult::Error { message } => message.clone(),
        other => panic!("Expected error result, got {other:?}"),
    };

    for model in ["alpha", "beta", "gamma"] {
        assert_eq!(message.matches(model).count(), 1, "{model} in {message}");
    }
    let alpha = message.find("alpha").unwrap();
    let beta = message.find("beta").unwrap();
    let gamma = message.find("gamma").unwrap();
    assert!(alpha < beta && beta < gamma);
    assert!(!message.contains("The model is overloaded."), "raw backend text leaked: {message}");
    assert!(report.attempts.iter().all(|a| a.attempts_made == 1));
    assert_eq!(backend.called_models(), vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_missing_credentials_make_no_calls() {
    let backend = Arc::new(ScriptedBackend::new().on_stream("alpha", ScriptedReply::text("unused")));
    let orch = orchestrator(&backend, OrchestratorConfig { discover_models: true, ..config(&["alpha"]) });

    let result = orch.generate(&GenerationRequest::text("hi"), &Credentials::new("   ")).await;

    assert!(result.is_error());
    assert!(result.to_string().contains("Missing API key"));
    assert!(backend.calls().is_empty());
    assert_eq!(backend.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pause_between_models_but_not_after_last() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", unavailable())
            .on_stream("beta", unavailable()),
    );
    let orch = orchestrator(&backend, OrchestratorConfig { inter_model_delay_ms: 2000, ..config(&["alpha", "beta"]) });

    let start = Instant::now();
    let result = orch.generate(&GenerationRequest::text("hi"), &creds()).await;
    let elapsed = start.elapsed();

    assert!(result.is_error());
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(4), "slept {elapsed:?}");
}

#[tokio::test]
async fn test_concurrent_requests_share_one_orchestrator() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on_stream("alpha", ScriptedReply::text("first"))
            .on_stream("alpha", ScriptedReply::text("second")),
    );
    let orch = orchestrator(&backend, config(&["alpha"]));
    let (left, right) = (GenerationRequest::text("one"), GenerationRequest::text("two"));
    let credentials = creds();

    let (a, b) = tokio::join!(orch.generate(&left, &credentials), orch.generate(&right, &credentials));

    let mut texts = vec![a.to_string(), b.to_string()];
    texts.sort();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(backend.called_models().len(), 2);
}

struct FixedCatalog(Vec<String>);

#[async_trait]
impl ModelCatalog for FixedCatalog {
    async fn resolve(&self, _credentials: &Credentials) -> Vec<String> {
        self.0.clone()
    }
}

#[tokio::test]
async fn test_custom_catalog_restricts_candidates() {
    let backend = Arc::new(ScriptedBackend::new().on_stream("beta", ScriptedReply::text("beta answers")));
    let orch = orchestrator(&backend, OrchestratorConfig { discover_models: true, ..config(&["alpha", "beta"]) })
        .with_catalog(Arc::new(FixedCatalog(vec!["beta".to_string()])));

    let result = orch.generate(&GenerationRequest::text("hi"), &creds()).await;

    assert_eq!(result, NormalizedResult::text("beta answers"));
    assert_eq!(backend.called_models(), vec!["beta"]);
    assert_eq!(backend.list_calls(), 0);
}
