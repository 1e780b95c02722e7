//! Scripted in-memory backend for testing and development.
//!
//! Each model id owns two queues of canned replies, one for streamed calls and one
//! for batch calls. Every call is recorded so tests can assert on what was sent.

use async_trait::async_trait;
use futures::stream;
use gemlink_abstraction::{
    ContentFragment, Credentials, FragmentStream, GenerativeBackend, ModelError, ModelInfo,
    ResponseModality,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One canned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// The call succeeds and yields these fragments.
    Fragments(Vec<ContentFragment>),
    /// The call is rejected before any content.
    Fail(ModelError),
    /// The stream yields some fragments, then breaks with an error.
    /// For batch calls this behaves like `Fail`.
    FailMidStream {
        /// Fragments delivered before the failure.
        fragments: Vec<ContentFragment>,
        /// The error that ends the stream.
        error: ModelError,
    },
}

impl ScriptedReply {
    /// A successful single-text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Fragments(vec![ContentFragment::Text(text.into())])
    }

    /// A failure with the given HTTP status and body.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Fail(ModelError::Api { status, body: body.into() })
    }
}

/// Whether a recorded call was streamed or batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `stream_content`
    Streamed,
    /// `generate_content`
    Batch,
}

/// A recorded generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    /// Model the call targeted.
    pub model: String,
    /// Modalities requested.
    pub modalities: Vec<ResponseModality>,
    /// Streamed or batch.
    pub kind: CallKind,
}

/// In-memory backend replaying scripted replies.
///
/// Models without a queued reply answer with a 404 `NOT_FOUND` error, the same way the
/// real API treats unknown model ids.
#[derive(Debug)]
pub struct ScriptedBackend {
    listing: Result<Vec<ModelInfo>, ModelError>,
    streamed: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    batch: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    calls: Mutex<Vec<ScriptedCall>>,
    list_calls: AtomicUsize,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(model: &str) -> ModelError {
    ModelError::Api {
        status: 404,
        body: format!(
            r#"{{"error":{{"code":404,"message":"models/{model} is not found for API version v1beta","status":"NOT_FOUND"}}}}"#
        ),
    }
}

impl ScriptedBackend {
    /// Creates a backend with an empty listing and no scripted replies.
    pub fn new() -> Self {
        Self {
            listing: Ok(Vec::new()),
            streamed: Mutex::new(HashMap::new()),
            batch: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the models returned by `list_models`.
    #[must_use]
    pub fn with_listing(mut self, models: Vec<ModelInfo>) -> Self {
        self.listing = Ok(models);
        self
    }

    /// Makes `list_models` fail.
    #[must_use]
    pub fn with_listing_error(mut self, error: ModelError) -> Self {
        self.listing = Err(error);
        self
    }

    /// Queues a reply for the next streamed call to `model`.
    #[must_use]
    pub fn on_stream(self, model: &str, reply: ScriptedReply) -> Self {
        lock(&self.streamed).entry(model.to_string()).or_default().push_back(reply);
        self
    }

    /// Queues a reply for the next batch call to `model`.
    #[must_use]
    pub fn on_generate(self, model: &str, reply: ScriptedReply) -> Self {
        lock(&self.batch).entry(model.to_string()).or_default().push_back(reply);
        self
    }

    /// All generation calls made so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        lock(&self.calls).clone()
    }

    /// Model ids of the generation calls made so far, in order.
    pub fn called_models(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.model.clone()).collect()
    }

    /// Number of `list_models` calls made so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn next_reply(
        &self,
        queue: &Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
        model: &str,
        modalities: &[ResponseModality],
        kind: CallKind,
    ) -> Option<ScriptedReply> {
        lock(&self.calls).push(ScriptedCall {
            model: model.to_string(),
            modalities: modalities.to_vec(),
            kind,
        });
        let reply = lock(queue).get_mut(model).and_then(VecDeque::pop_front);
        debug!(model_id = %model, kind = ?kind, reply = ?reply, "Scripted backend reply");
        reply
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn list_models(&self, credentials: &Credentials) -> Result<Vec<ModelInfo>, ModelError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !credentials.is_present() {
            return Err(ModelError::MissingCredential);
        }
        self.listing.clone()
    }

    async fn stream_content(
        &self,
        credentials: &Credentials,
        model: &str,
        _prompt: &str,
        modalities: &[ResponseModality],
    ) -> Result<FragmentStream, ModelError> {
        if !credentials.is_present() {
            return Err(ModelError::MissingCredential);
        }

        match self.next_reply(&self.streamed, model, modalities, CallKind::Streamed) {
            Some(ScriptedReply::Fragments(fragments)) => {
                Ok(Box::pin(stream::iter(fragments.into_iter().map(Ok::<_, ModelError>))))
            }
            Some(ScriptedReply::FailMidStream { fragments, error }) => {
                let items = fragments.into_iter().map(Ok).chain(std::iter::once(Err(error)));
                Ok(Box::pin(stream::iter(items)))
            }
            Some(ScriptedReply::Fail(error)) => Err(error),
            None => Err(not_found(model)),
        }
    }

    async fn generate_content(
        &self,
        credentials: &Credentials,
        model: &str,
        _prompt: &str,
        modalities: &[ResponseModality],
    ) -> Result<Vec<ContentFragment>, ModelError> {
        if !credentials.is_present() {
            return Err(ModelError::MissingCredential);
        }

        match self.next_reply(&self.batch, model, modalities, CallKind::Batch) {
            Some(ScriptedReply::Fragments(fragments)) => Ok(fragments),
            Some(ScriptedReply::Fail(error) | ScriptedReply::FailMidStream { error, .. }) => Err(error),
            None => Err(not_found(model)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let backend = ScriptedBackend::new()
            .on_stream("m", ScriptedReply::status(429, "slow down"))
            .on_stream("m", ScriptedReply::text("hello"));
        let creds = Credentials::new("k");
        let modes = ResponseModality::for_mode(true);

        assert!(backend.stream_content(&creds, "m", "p", modes).await.is_err());
        let stream = backend.stream_content(&creds, "m", "p", modes).await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Ok(ContentFragment::Text("hello".to_string()))]);
        assert_eq!(backend.called_models(), vec!["m", "m"]);
    }

    #[tokio::test]
    async fn test_unscripted_model_is_not_found() {
        let backend = ScriptedBackend::new();
        let err = backend
            .generate_content(&Credentials::new("k"), "ghost", "p", ResponseModality::for_mode(false))
            .await
            .unwrap_err();

        match err {
            ModelError::Api { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("NOT_FOUND"));
                assert!(body.contains("models/ghost"));
            }
            other => panic!("Expected 404, got {other:?}"),
        }
        assert_eq!(backend.calls()[0].kind, CallKind::Batch);
    }

    #[tokio::test]
    async fn test_fail_mid_stream_yields_then_errors() {
        let backend = ScriptedBackend::new().on_stream(
            "m",
            ScriptedReply::FailMidStream {
                fragments: vec![ContentFragment::Text("par".to_string())],
                error: ModelError::StreamError("reset".to_string()),
            },
        );
        let stream = backend
            .stream_content(&Credentials::new("k"), "m", "p", ResponseModality::for_mode(true))
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }
}
