//! Storage backends: the search/insert seams plus the Postgres and in-memory
//! implementations behind them.

pub mod memory;
pub mod postgres;
pub mod table;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::error::StorageError;
use crate::models::{NewDocument, NewProduct, Product, Scored};

pub use memory::MemoryStore;
pub use table::TableName;

/// Read side of a table: the two ranked legs a hybrid search combines.
#[async_trait]
pub trait SearchBackend<T>: Send + Sync {
    /// Up to `top_k` records ordered by ascending vector distance.
    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Scored<T>>, StorageError>;

    /// Up to `top_k` records ordered by descending text relevance.
    async fn text_search(&self, query: &str, top_k: usize)
        -> Result<Vec<Scored<T>>, StorageError>;
}

/// Point reads by primary key.
#[async_trait]
pub trait RecordLookup<T>: Send + Sync {
    /// The record stored under `id`. Product tables only expose active rows.
    async fn get_by_id(&self, id: i64) -> Result<Option<T>, StorageError>;
}

/// Product reads by catalogue code, the key hits are linked back with.
#[async_trait]
pub trait ProductLookup: RecordLookup<Product> {
    /// The active product carrying `code`; the oldest row wins if the code
    /// was ingested twice.
    async fn get_by_code(&self, code: &str) -> Result<Option<Product>, StorageError>;
}

/// Write side of a table.
#[async_trait]
pub trait RecordSink<N: Sync>: Send {
    /// Persists one record and returns its assigned id.
    async fn insert(&mut self, record: &N) -> Result<i64, StorageError>;

    /// Persists a batch, returning ids in input order.
    async fn insert_batch(&mut self, records: &[N]) -> Result<Vec<i64>, StorageError> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.insert(record).await?);
        }
        Ok(ids)
    }
}

/// Product text the lexical leg matches against.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductTextField {
    /// Product name only.
    Name,
    /// Long description only.
    #[default]
    Description,
    /// Name and description together.
    NameAndDescription,
}

impl ProductTextField {
    /// Generated tsvector column backing this field.
    pub fn tsv_column(self) -> &'static str {
        match self {
            Self::Name => "name_tsv",
            Self::Description => "description_tsv",
            Self::NameAndDescription => "search_tsv",
        }
    }
}

/// Removes NUL bytes, which Postgres rejects in text columns.
pub fn sanitize_text(input: &str) -> String {
    input.replace('\0', "")
}

pub(crate) fn check_dimension(expected: usize, embedding: &[f32]) -> Result<(), StorageError> {
    if embedding.len() != expected {
        return Err(StorageError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

pub(crate) fn validate_document(record: &NewDocument, dims: usize) -> Result<(), StorageError> {
    if record.content.trim().is_empty() {
        return Err(StorageError::InvalidRecord(
            "document content must not be empty".into(),
        ));
    }
    check_dimension(dims, &record.embedding)
}

pub(crate) fn validate_product(record: &NewProduct, dims: usize) -> Result<(), StorageError> {
    let listing = &record.listing;
    if listing.code.trim().is_empty() {
        return Err(StorageError::InvalidRecord(
            "product code must not be empty".into(),
        ));
    }
    if listing.description.trim().is_empty() {
        return Err(StorageError::InvalidRecord(format!(
            "product {} has an empty description",
            listing.code
        )));
    }
    if !listing.price.is_finite() {
        return Err(StorageError::InvalidRecord(format!(
            "product {} has a non-finite price",
            listing.code
        )));
    }
    check_dimension(dims, &record.embedding)
}
