//! Model catalog discovery.
//!
//! Discovery is an optimization: every failure degrades to an empty list, which
//! callers read as "use the static preference list".

use async_trait::async_trait;
use gemlink_abstraction::{Credentials, GenerativeBackend};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Source of the models currently available for content generation.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Returns generation-capable model ids in the order the backend reported them.
    /// Never fails; an empty list means "unknown".
    async fn resolve(&self, credentials: &Credentials) -> Vec<String>;
}

/// Queries the backend's listing endpoint on every call.
#[derive(Clone)]
pub struct CatalogResolver {
    backend: Arc<dyn GenerativeBackend>,
}

impl CatalogResolver {
    /// Creates a resolver over the given backend.
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ModelCatalog for CatalogResolver {
    async fn resolve(&self, credentials: &Credentials) -> Vec<String> {
        let models = match self.backend.list_models(credentials).await {
            Ok(models) => models,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Failed to fetch models list");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let available: Vec<String> = models
            .iter()
            .filter(|m| m.supports_generation())
            .map(|m| m.id().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        info!(count = available.len(), models = ?available, "Available models discovered");
        available
    }
}

/// Fetches the catalog once and shares it read-only afterwards.
///
/// Empty results are not cached, so a later call gets another chance at discovery.
pub struct CachedCatalog<C = CatalogResolver> {
    inner: C,
    cache: OnceCell<Vec<String>>,
}

impl<C: ModelCatalog> CachedCatalog<C> {
    /// Wraps a catalog with a fetch-once cache.
    pub fn new(inner: C) -> Self {
        Self { inner, cache: OnceCell::new() }
    }

    /// Returns true once a non-empty catalog has been cached.
    pub fn is_cached(&self) -> bool {
        self.cache.initialized()
    }
}

#[async_trait]
impl<C: ModelCatalog> ModelCatalog for CachedCatalog<C> {
    async fn resolve(&self, credentials: &Credentials) -> Vec<String> {
        let cached = self
            .cache
            .get_or_try_init(|| async {
                let models = self.inner.resolve(credentials).await;
                if models.is_empty() { Err(()) } else { Ok(models) }
            })
            .await;

        cached.cloned().unwrap_or_default()
    }
}
