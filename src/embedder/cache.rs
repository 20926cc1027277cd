//! LRU cache for query embeddings.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::trace;

use crate::embedder::EmbeddingProvider;
use crate::error::EmbeddingError;

/// Wraps a provider and memoises single-text `embed` calls.
///
/// Batch calls (ingestion) go straight to the inner provider. Only vectors
/// are cached, never search scores.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    /// Wraps `inner` with room for `capacity` queries; `None` when 0.
    pub fn wrap(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_batch(inputs).await
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(hit) = {
            let mut guard = self.cache.lock().await;
            guard.get(input).cloned()
        } {
            trace!("query embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.inner.embed(input).await?;
        let mut guard = self.cache.lock().await;
        guard.put(input.to_string(), embedding.clone());
        Ok(embedding)
    }
}
