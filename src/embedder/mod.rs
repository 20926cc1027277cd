//! Embedding providers: the trait every backend implements plus the HTTP,
//! hashing, and caching implementations.

pub mod cache;
pub mod hashing;
pub mod openai;

use async_trait::async_trait;

use crate::error::EmbeddingError;

pub use cache::CachedEmbedder;
pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension D of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embeds each input, returning vectors in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embeds a single text.
    async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(EmbeddingError::Malformed(
                "expected exactly one embedding for one input".into(),
            )),
        }
    }
}

/// Rejects any vector whose length is not `expected`.
pub fn check_dimensions(expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    match vectors.iter().find(|vector| vector.len() != expected) {
        Some(vector) => Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        None => Ok(()),
    }
}
