//! Runtime configuration: validated tuning structs plus the clap argument
//! groups every binary flattens into its own CLI.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::embedder::{CachedEmbedder, EmbeddingProvider, HashingEmbedder, OpenAiEmbedder};
use crate::error::{ConfigurationError, EmbeddingError};
use crate::fusion::{RankFusion, DEFAULT_RRF_K};
use crate::store::ProductTextField;

/// Default dimension D of every stored embedding.
pub const DEFAULT_EMBEDDING_DIM: usize = 1024;

/// Chunk and window sizing used by the chunker. Sizes are in characters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkerConfig {
    small_chunk_size: usize,
    small_chunk_overlap: usize,
    window_size: usize,
    window_overlap: usize,
}

impl ChunkerConfig {
    /// Validates and builds a chunker configuration.
    pub fn new(
        small_chunk_size: usize,
        small_chunk_overlap: usize,
        window_size: usize,
        window_overlap: usize,
    ) -> Result<Self, ConfigurationError> {
        if small_chunk_size == 0 {
            return Err(ConfigurationError::ZeroSize {
                field: "small_chunk_size",
            });
        }
        if window_size == 0 {
            return Err(ConfigurationError::ZeroSize {
                field: "window_size",
            });
        }
        if small_chunk_overlap >= small_chunk_size {
            return Err(ConfigurationError::OverlapTooLarge {
                field: "small_chunk_overlap",
                overlap: small_chunk_overlap,
                size: small_chunk_size,
            });
        }
        if window_overlap >= window_size {
            return Err(ConfigurationError::OverlapTooLarge {
                field: "window_overlap",
                overlap: window_overlap,
                size: window_size,
            });
        }
        if window_size < small_chunk_size {
            return Err(ConfigurationError::WindowTooSmall {
                window_size,
                small_chunk_size,
            });
        }
        Ok(Self {
            small_chunk_size,
            small_chunk_overlap,
            window_size,
            window_overlap,
        })
    }

    /// Maximum characters per search chunk.
    pub fn small_chunk_size(&self) -> usize {
        self.small_chunk_size
    }

    /// Characters shared by adjacent search chunks.
    pub fn small_chunk_overlap(&self) -> usize {
        self.small_chunk_overlap
    }

    /// Target characters per context window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Accepted for parity with the chunk settings; windows are centred on
    /// their chunk, so this value only participates in validation.
    pub fn window_overlap(&self) -> usize {
        self.window_overlap
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            small_chunk_size: 150,
            small_chunk_overlap: 20,
            window_size: 1000,
            window_overlap: 0,
        }
    }
}

/// Knobs for hybrid retrieval.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalConfig {
    fusion: RankFusion,
    candidate_multiplier: usize,
    leg_timeout: Option<Duration>,
}

impl RetrievalConfig {
    /// Validates and builds a retrieval configuration.
    pub fn new(
        rrf_k: f64,
        candidate_multiplier: usize,
        leg_timeout: Option<Duration>,
    ) -> Result<Self, ConfigurationError> {
        if candidate_multiplier == 0 {
            return Err(ConfigurationError::ZeroCandidateMultiplier);
        }
        Ok(Self {
            fusion: RankFusion::new(rrf_k)?,
            candidate_multiplier,
            leg_timeout,
        })
    }

    /// Fusion engine applied to hybrid results.
    pub fn fusion(&self) -> RankFusion {
        self.fusion
    }

    /// Each leg of a hybrid call fetches `top_k * candidate_multiplier` rows.
    pub fn candidate_multiplier(&self) -> usize {
        self.candidate_multiplier
    }

    /// Deadline applied to each leg independently.
    pub fn leg_timeout(&self) -> Option<Duration> {
        self.leg_timeout
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fusion: RankFusion::default(),
            candidate_multiplier: 2,
            leg_timeout: None,
        }
    }
}

/// Postgres connection and table layout.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Postgres connection string (postgres://...); required by every
    /// command that touches the database
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Schema holding the documents and products tables
    #[arg(long, env = "SHOPRAG_SCHEMA", default_value = "public")]
    pub schema: String,

    /// Table storing document chunks
    #[arg(long, env = "SHOPRAG_DOCUMENTS_TABLE", default_value = "documents")]
    pub documents_table: String,

    /// Table storing the product catalogue
    #[arg(long, env = "SHOPRAG_PRODUCTS_TABLE", default_value = "products")]
    pub products_table: String,

    /// Full-text language passed to to_tsvector / plainto_tsquery
    #[arg(long, env = "SHOPRAG_FTS_LANGUAGE", default_value = "english")]
    pub fts_language: String,

    /// Product column searched by the lexical leg
    #[arg(
        long,
        env = "SHOPRAG_PRODUCT_TEXT_FIELD",
        value_enum,
        default_value_t = ProductTextField::Description
    )]
    pub product_text_field: ProductTextField,
}

impl DatabaseArgs {
    /// Connection string, or an error naming the missing setting.
    pub fn url(&self) -> Result<&str, ConfigurationError> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigurationError::MissingSetting("DATABASE_URL"))
    }
}

/// Embedding backend selection.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Local feature-hashing embedder; no network, deterministic.
    Hashing,
}

/// Embedding provider options.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// Which embedding backend to use
    #[arg(long, env = "SHOPRAG_EMBEDDER", value_enum, default_value_t = ProviderKind::Openai)]
    pub embedder: ProviderKind,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Embedding model identifier
    #[arg(
        long,
        env = "SHOPRAG_OPENAI_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub openai_model: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(
        long,
        env = "SHOPRAG_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Dimension D of every stored vector; requested from the API and
    /// enforced on every response
    #[arg(long, env = "SHOPRAG_EMBEDDING_DIM", default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub embedding_dim: usize,

    /// Max inputs per embedding request
    #[arg(long, env = "SHOPRAG_OPENAI_BATCH", default_value_t = 32)]
    pub openai_batch_size: usize,

    /// Seconds before embedding requests time out
    #[arg(long, env = "SHOPRAG_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    pub openai_timeout_secs: u64,

    /// Retry attempts for transient embedding errors
    #[arg(long, env = "SHOPRAG_OPENAI_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,

    /// Max cached query embeddings kept in memory (0 disables caching)
    #[arg(long, env = "SHOPRAG_EMBEDDING_CACHE", default_value_t = 1024)]
    pub embedding_cache_size: usize,
}

impl EmbedderArgs {
    /// Builds the configured provider, wrapped in the query cache when enabled.
    pub fn build(&self) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        let provider: Arc<dyn EmbeddingProvider> = match self.embedder {
            ProviderKind::Openai => {
                let api_key = self.openai_api_key.clone().ok_or_else(|| {
                    EmbeddingError::InvalidConfig(
                        "OPENAI_API_KEY is required for the openai embedder".into(),
                    )
                })?;
                Arc::new(OpenAiEmbedder::new(
                    api_key,
                    self.openai_base_url.clone(),
                    self.openai_model.clone(),
                    self.embedding_dim,
                    Duration::from_secs(self.openai_timeout_secs.max(1)),
                    self.max_retries.max(1),
                    self.openai_batch_size.max(1),
                )?)
            }
            ProviderKind::Hashing => Arc::new(HashingEmbedder::new(self.embedding_dim)?),
        };
        Ok(match CachedEmbedder::wrap(provider.clone(), self.embedding_cache_size) {
            Some(cached) => Arc::new(cached),
            None => provider,
        })
    }
}

/// Chunk and window sizing flags.
#[derive(Args, Debug, Clone)]
pub struct ChunkerArgs {
    /// Max characters per search chunk
    #[arg(long, env = "SHOPRAG_CHUNK_SIZE", default_value_t = 150)]
    pub chunk_size: usize,

    /// Characters shared by adjacent search chunks
    #[arg(long, env = "SHOPRAG_CHUNK_OVERLAP", default_value_t = 20)]
    pub chunk_overlap: usize,

    /// Characters per context window
    #[arg(long, env = "SHOPRAG_WINDOW_SIZE", default_value_t = 1000)]
    pub window_size: usize,

    /// Window overlap (validated only)
    #[arg(long, env = "SHOPRAG_WINDOW_OVERLAP", default_value_t = 0)]
    pub window_overlap: usize,
}

impl ChunkerArgs {
    /// Validates the flags into a [`ChunkerConfig`].
    pub fn to_config(&self) -> Result<ChunkerConfig, ConfigurationError> {
        ChunkerConfig::new(
            self.chunk_size,
            self.chunk_overlap,
            self.window_size,
            self.window_overlap,
        )
    }
}

/// Hybrid retrieval flags.
#[derive(Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// Reciprocal Rank Fusion constant (higher softens score differences)
    #[arg(long, env = "SHOPRAG_RRF_K", default_value_t = DEFAULT_RRF_K)]
    pub rrf_k: f64,

    /// Candidates fetched per leg, as a multiple of top-k
    #[arg(long, env = "SHOPRAG_CANDIDATE_MULTIPLIER", default_value_t = 2)]
    pub candidate_multiplier: usize,

    /// Per-leg deadline in milliseconds; unset waits indefinitely
    #[arg(long, env = "SHOPRAG_LEG_TIMEOUT_MS")]
    pub leg_timeout_ms: Option<u64>,
}

impl RetrievalArgs {
    /// Validates the flags into a [`RetrievalConfig`].
    pub fn to_config(&self) -> Result<RetrievalConfig, ConfigurationError> {
        RetrievalConfig::new(
            self.rrf_k,
            self.candidate_multiplier,
            self.leg_timeout_ms.map(Duration::from_millis),
        )
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "shoprag=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
