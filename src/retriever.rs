//! Query-time retrieval: semantic, lexical, and fused hybrid search over one
//! record type, plus the [`KnowledgeBase`] facade over documents and products.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::embedder::EmbeddingProvider;
use crate::error::{RetrievalError, Stage, StorageError};
use crate::models::{DocumentChunk, Product, Record, Scored};
use crate::store::{ProductLookup, RecordLookup, SearchBackend};

/// Runs the retrieval legs against one backend and fuses them.
///
/// The type parameter pins the record type, so document and product results
/// can never be fused together.
pub struct HybridRetriever<T> {
    embedder: Arc<dyn EmbeddingProvider>,
    backend: Arc<dyn SearchBackend<T>>,
    config: RetrievalConfig,
}

impl<T> HybridRetriever<T>
where
    T: Record + Send + Sync + 'static,
{
    /// Builds a retriever over `backend`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn SearchBackend<T>>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            backend,
            config,
        }
    }

    /// Tuning this retriever runs with.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Nearest records by embedding distance, closest first.
    pub async fn retrieve_similar(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<T>>, RetrievalError> {
        let query = normalize_query(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embed_query(query).await?;
        self.semantic_leg(&embedding, top_k).await
    }

    /// Best full-text matches, most relevant first.
    pub async fn retrieve_text_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<T>>, RetrievalError> {
        let query = normalize_query(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.lexical_leg(query, top_k).await
    }

    /// Runs both legs concurrently with widened candidate lists and fuses
    /// them with RRF. Any leg failure fails the whole call.
    pub async fn retrieve_hybrid(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<T>>, RetrievalError> {
        let query = normalize_query(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let candidates = top_k.saturating_mul(self.config.candidate_multiplier());
        let started = Instant::now();

        let semantic = async {
            let embedding = self.embed_query(query).await?;
            self.semantic_leg(&embedding, candidates).await
        };
        let lexical = self.lexical_leg(query, candidates);
        let (semantic, lexical) = tokio::try_join!(semantic, lexical)?;

        let semantic_hits = semantic.len();
        let lexical_hits = lexical.len();
        let fused = self.config.fusion().fuse(semantic, lexical, top_k);
        info!(
            top_k,
            candidates,
            semantic_hits,
            lexical_hits,
            returned = fused.len(),
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "hybrid retrieval"
        );
        Ok(fused)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        self.deadline(Stage::Embedding, self.embedder.embed(query))
            .await?
            .map_err(RetrievalError::Embedding)
    }

    async fn semantic_leg(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Scored<T>>, RetrievalError> {
        let hits = self
            .deadline(Stage::Semantic, self.backend.vector_search(embedding, limit))
            .await?
            .map_err(RetrievalError::Semantic)?;
        debug!(limit, hits = hits.len(), "semantic leg");
        Ok(hits)
    }

    async fn lexical_leg(&self, query: &str, limit: usize) -> Result<Vec<Scored<T>>, RetrievalError> {
        let hits = self
            .deadline(Stage::Lexical, self.backend.text_search(query, limit))
            .await?
            .map_err(RetrievalError::Lexical)?;
        debug!(limit, hits = hits.len(), "lexical leg");
        Ok(hits)
    }

    async fn deadline<F>(&self, stage: Stage, future: F) -> Result<F::Output, RetrievalError>
    where
        F: Future,
    {
        match self.config.leg_timeout() {
            Some(limit) => tokio::time::timeout(limit, future)
                .await
                .map_err(|_| RetrievalError::Timeout {
                    stage,
                    elapsed_ms: limit.as_millis() as u64,
                }),
            None => Ok(future.await),
        }
    }
}

fn normalize_query(query: &str) -> Result<&str, RetrievalError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(RetrievalError::EmptyQuery);
    }
    Ok(trimmed)
}

/// Retrieval and point lookups over both tables of the store.
pub struct KnowledgeBase {
    documents: HybridRetriever<DocumentChunk>,
    products: HybridRetriever<Product>,
    document_lookup: Arc<dyn RecordLookup<DocumentChunk>>,
    product_lookup: Arc<dyn ProductLookup>,
}

impl KnowledgeBase {
    /// Builds both retrievers around one embedder and config.
    pub fn new<D, P>(
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Arc<D>,
        products: Arc<P>,
        config: RetrievalConfig,
    ) -> Self
    where
        D: SearchBackend<DocumentChunk> + RecordLookup<DocumentChunk> + 'static,
        P: SearchBackend<Product> + ProductLookup + 'static,
    {
        let document_search: Arc<dyn SearchBackend<DocumentChunk>> = documents.clone();
        let product_search: Arc<dyn SearchBackend<Product>> = products.clone();
        Self {
            documents: HybridRetriever::new(embedder.clone(), document_search, config.clone()),
            products: HybridRetriever::new(embedder, product_search, config),
            document_lookup: documents,
            product_lookup: products,
        }
    }

    /// Retriever over document chunks.
    pub fn documents(&self) -> &HybridRetriever<DocumentChunk> {
        &self.documents
    }

    /// Retriever over active products.
    pub fn products(&self) -> &HybridRetriever<Product> {
        &self.products
    }

    /// Hybrid search over document chunks; each hit carries its `source`.
    pub async fn retrieve_hybrid_documents(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<DocumentChunk>>, RetrievalError> {
        self.documents.retrieve_hybrid(query, top_k).await
    }

    /// Hybrid search over active products; each hit carries its `code`.
    pub async fn retrieve_hybrid_products(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<Product>>, RetrievalError> {
        self.products.retrieve_hybrid(query, top_k).await
    }

    /// Document chunk stored under `id`.
    pub async fn get_document_by_id(&self, id: i64) -> Result<Option<DocumentChunk>, StorageError> {
        self.document_lookup.get_by_id(id).await
    }

    /// Active product stored under `id`.
    pub async fn get_product_by_id(&self, id: i64) -> Result<Option<Product>, StorageError> {
        self.product_lookup.get_by_id(id).await
    }

    /// Active product carrying catalogue `code`.
    pub async fn get_product_by_code(&self, code: &str) -> Result<Option<Product>, StorageError> {
        self.product_lookup.get_by_code(code).await
    }
}
