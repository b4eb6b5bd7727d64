use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::service::{Category, HttpSchemaSource, ModelRef, SchemaSource};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CATEGORIES_KEY: &str = "categories";

/// Process-wide memoization of the schema service's read operations.
///
/// Constructed once per session and cloned into every node extension; clones
/// share the same maps. Entries expire after the configured TTL.
///
/// Concurrent misses on the same key each fetch; the last write wins. Collapsing
/// them into one in-flight request would save the duplicate round-trips.
#[derive(Clone)]
pub struct SchemaCache {
    source: Arc<dyn SchemaSource>,
    ttl: Duration,
    // Value: (response, fetched at)
    categories: Arc<DashMap<String, (Vec<Category>, Instant)>>,
    // Key: category value
    models: Arc<DashMap<String, (Vec<ModelRef>, Instant)>>,
    // Key: model id
    schemas: Arc<DashMap<String, (Value, Instant)>>,
}

impl SchemaCache {
    pub fn new(source: Arc<dyn SchemaSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            categories: Arc::new(DashMap::new()),
            models: Arc::new(DashMap::new()),
            schemas: Arc::new(DashMap::new()),
        }
    }

    /// A cache over the HTTP service described by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let source = HttpSchemaSource::new(config)?;
        Ok(Self::new(Arc::new(source), config.cache_ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Empty on failure: callers treat that as "no data yet".
    pub async fn categories(&self) -> Vec<Category> {
        memoized(
            &self.categories,
            CATEGORIES_KEY,
            self.ttl,
            self.source.categories(),
        )
        .await
        .unwrap_or_default()
    }

    pub async fn models(&self, category: &str) -> Vec<ModelRef> {
        memoized(&self.models, category, self.ttl, self.source.models(category))
            .await
            .unwrap_or_default()
    }

    /// The raw parameter schema of a model, `None` when absent or unavailable.
    pub async fn model_schema(&self, model_id: &str) -> Option<Value> {
        let fetch = async {
            self.source
                .model_schema(model_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Model '{model_id}' has no input schema"))
        };
        memoized(&self.schemas, model_id, self.ttl, fetch).await
    }

    /// Resolves a model id to its display name through the category's model list.
    pub async fn model_name(&self, category: &str, model_id: &str) -> Option<String> {
        self.models(category)
            .await
            .into_iter()
            .find(|m| m.value == model_id)
            .map(|m| m.name)
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.len();
        self.categories.retain(|_, (_, at)| at.elapsed() < self.ttl);
        self.models.retain(|_, (_, at)| at.elapsed() < self.ttl);
        self.schemas.retain(|_, (_, at)| at.elapsed() < self.ttl);
        before.saturating_sub(self.len())
    }

    pub fn clear(&self) {
        self.categories.clear();
        self.models.clear();
        self.schemas.clear();
    }

    pub fn len(&self) -> usize {
        self.categories.len() + self.models.len() + self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn memoized<T: Clone>(
    map: &DashMap<String, (T, Instant)>,
    key: &str,
    ttl: Duration,
    fetch: impl Future<Output = anyhow::Result<T>>,
) -> Option<T> {
    if let Some(entry) = map.get(key)
        && entry.1.elapsed() < ttl
    {
        tracing::debug!(key, "Schema cache hit");
        return Some(entry.0.clone());
    }

    match fetch.await {
        Ok(value) => {
            map.insert(key.to_string(), (value.clone(), Instant::now()));
            Some(value)
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Schema service fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SchemaSource for CountingSource {
        async fn categories(&self) -> anyhow::Result<Vec<Category>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("offline");
            }
            Ok(vec![Category {
                name: "Text to Image".to_string(),
                value: "text-to-image".to_string(),
            }])
        }

        async fn models(&self, _category: &str) -> anyhow::Result<Vec<ModelRef>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ModelRef {
                name: "Flux Dev".to_string(),
                value: "wavespeed-ai/flux-dev".to_string(),
            }])
        }

        async fn model_schema(&self, model_id: &str) -> anyhow::Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((model_id == "known").then(|| json!({"properties": {}})))
        }
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let source = Arc::new(CountingSource::default());
        let cache = SchemaCache::new(source.clone(), Duration::from_secs(300));

        assert_eq!(cache.categories().await.len(), 1);
        assert_eq!(cache.categories().await.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let source = Arc::new(CountingSource::default());
        let cache = SchemaCache::new(source.clone(), Duration::ZERO);

        cache.models("text-to-image").await;
        cache.models("text-to-image").await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_empty_and_not_cached() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..Default::default()
        });
        let cache = SchemaCache::new(source.clone(), Duration::from_secs(300));

        assert!(cache.categories().await.is_empty());
        assert!(cache.categories().await.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_absent_schema_and_name_resolution() {
        let cache = SchemaCache::new(Arc::new(CountingSource::default()), Duration::from_secs(300));

        assert!(cache.model_schema("unknown").await.is_none());
        assert!(cache.model_schema("known").await.is_some());
        assert_eq!(
            cache
                .model_name("text-to-image", "wavespeed-ai/flux-dev")
                .await
                .as_deref(),
            Some("Flux Dev")
        );
        assert_eq!(cache.model_name("text-to-image", "other").await, None);
    }
}
