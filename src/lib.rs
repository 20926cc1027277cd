#![warn(missing_docs)]
//! Hybrid semantic + full-text retrieval for an e-commerce knowledge base.
//!
//! Documents are split into small search chunks with wider context windows,
//! embedded, and stored in Postgres (pgvector + tsvector). Queries run a
//! vector leg and a lexical leg concurrently and fuse them with Reciprocal
//! Rank Fusion.

pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod fusion;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod retriever;
pub mod store;

pub use chunker::Chunker;
pub use config::{ChunkerConfig, RetrievalConfig};
pub use embedder::EmbeddingProvider;
pub use error::{
    ConfigurationError, EmbeddingError, IngestError, LoadError, RetrievalError, Stage,
    StorageError,
};
pub use fusion::{RankFusion, DEFAULT_RRF_K};
pub use models::{
    Chunk, DocumentChunk, NewDocument, NewProduct, Product, ProductListing, Record, Scored,
    SourceDocument,
};
pub use retriever::{HybridRetriever, KnowledgeBase};
pub use store::{
    MemoryStore, ProductLookup, RecordLookup, RecordSink, SearchBackend, TableName,
};
