//! Error taxonomy shared by the chunker, embedders, stores, and retrievers.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid sizing or tuning values, rejected before any work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// A chunk or window size of zero.
    #[error("{field} must be greater than zero")]
    ZeroSize {
        /// Offending setting name.
        field: &'static str,
    },
    /// Overlap that would never let the splitter advance.
    #[error("{field} ({overlap}) must be smaller than its size ({size})")]
    OverlapTooLarge {
        /// Offending setting name.
        field: &'static str,
        /// Configured overlap.
        overlap: usize,
        /// Configured size the overlap applies to.
        size: usize,
    },
    /// Windows must be able to contain the chunk they surround.
    #[error("window_size ({window_size}) must be >= small_chunk_size ({small_chunk_size})")]
    WindowTooSmall {
        /// Configured window size.
        window_size: usize,
        /// Configured small chunk size.
        small_chunk_size: usize,
    },
    /// RRF constant outside the usable range.
    #[error("rrf k must be finite and non-negative (got {0})")]
    InvalidRrfK(f64),
    /// Candidate multiplier of zero would starve the fusion stage.
    #[error("candidate multiplier must be at least 1")]
    ZeroCandidateMultiplier,
    /// Setting that the requested command cannot run without.
    #[error("{0} must be set")]
    MissingSetting(&'static str),
    /// Empty or otherwise unusable identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Failures raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport-level failure (connect, timeout, body).
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-success HTTP status after retries were exhausted.
    #[error("embedding endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, when readable.
        body: String,
    },
    /// Response decoded but did not match the request.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    /// Vector length differs from the index dimension.
    #[error("expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch {
        /// Configured dimension D.
        expected: usize,
        /// Length actually produced.
        actual: usize,
    },
    /// Provider could not be constructed.
    #[error("invalid embedder configuration: {0}")]
    InvalidConfig(String),
}

/// Failures raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not open a connection.
    #[error("failed to connect to postgres: {0}")]
    Connection(#[source] tokio_postgres::Error),
    /// Statement failed; `context` names the operation.
    #[error("{context}: {source}")]
    Query {
        /// Operation that failed.
        context: String,
        /// Driver error.
        #[source]
        source: tokio_postgres::Error,
    },
    /// Row returned by the database did not decode into the expected shape.
    #[error("unexpected row shape: {0}")]
    Row(String),
    /// Record rejected before it reached the database.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// Embedding length differs from the index dimension.
    #[error("expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch {
        /// Index dimension D.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },
}

impl StorageError {
    pub(crate) fn query(context: impl Into<String>, source: tokio_postgres::Error) -> Self {
        Self::Query {
            context: context.into(),
            source,
        }
    }
}

/// Pipeline stage a retrieval error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Query embedding.
    Embedding,
    /// Vector similarity leg.
    Semantic,
    /// Full-text leg.
    Lexical,
    /// Rank fusion.
    Fusion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Embedding => "embedding",
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::Fusion => "fusion",
        };
        f.write_str(label)
    }
}

/// Query-time failure, tagged with the stage that produced it.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Blank query text.
    #[error("query text must not be empty")]
    EmptyQuery,
    /// Query could not be embedded.
    #[error("embedding stage failed: {0}")]
    Embedding(#[source] EmbeddingError),
    /// Vector search failed.
    #[error("semantic search failed: {0}")]
    Semantic(#[source] StorageError),
    /// Full-text search failed.
    #[error("lexical search failed: {0}")]
    Lexical(#[source] StorageError),
    /// Fusion could not run.
    #[error("fusion failed: {0}")]
    Fusion(#[source] ConfigurationError),
    /// A leg exceeded its deadline; the whole call is aborted.
    #[error("{stage} stage timed out after {elapsed_ms} ms")]
    Timeout {
        /// Leg that timed out.
        stage: Stage,
        /// Configured deadline.
        elapsed_ms: u64,
    },
}

impl RetrievalError {
    /// Stage the error came from, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::EmptyQuery => None,
            Self::Embedding(_) => Some(Stage::Embedding),
            Self::Semantic(_) => Some(Stage::Semantic),
            Self::Lexical(_) => Some(Stage::Lexical),
            Self::Fusion(_) => Some(Stage::Fusion),
            Self::Timeout { stage, .. } => Some(*stage),
        }
    }
}

/// Failures while reading source files from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Directory traversal failed.
    #[error("failed to walk {path:?}: {source}")]
    Walk {
        /// Root being walked.
        path: PathBuf,
        /// Underlying walker error.
        #[source]
        source: walkdir::Error,
    },
    /// File could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Catalogue file is not valid JSON for the expected shape.
    #[error("invalid catalogue file {path:?}: {source}")]
    Json {
        /// File being parsed.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failures while ingesting a batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Embedding a batch failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Persisting a batch failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_errors_report_their_stage() {
        let err = RetrievalError::Lexical(StorageError::Row("column text_rank: missing".into()));
        assert_eq!(err.stage(), Some(Stage::Lexical));
        assert_eq!(
            err.to_string(),
            "lexical search failed: unexpected row shape: column text_rank: missing"
        );

        let timeout = RetrievalError::Timeout {
            stage: Stage::Semantic,
            elapsed_ms: 250,
        };
        assert_eq!(timeout.stage(), Some(Stage::Semantic));
        assert_eq!(timeout.to_string(), "semantic stage timed out after 250 ms");

        assert_eq!(RetrievalError::EmptyQuery.stage(), None);
    }
}
