//! Record shapes shared by ingestion, storage, and retrieval.
//!
//! Persisted shapes (`DocumentChunk`, `Product`) never carry query scores;
//! those live on [`Scored`], which is built fresh for every search call.

use serde::{Deserialize, Serialize};

/// Raw text unit handed to the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Full document text.
    pub content: String,
    /// File path or other identifier of the origin.
    pub source_id: String,
}

impl SourceDocument {
    /// Builds a source document.
    pub fn new(content: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
        }
    }
}

/// Searchable unit emitted by the chunker, before embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Text that gets embedded and full-text indexed.
    pub content: String,
    /// Wider span around `content`; `None` when the chunk could not be located.
    pub window_content: Option<String>,
    /// Identifier of the document the chunk came from.
    pub source: Option<String>,
}

/// Insert payload for the documents table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    /// Searchable chunk text.
    pub content: String,
    /// Context window; equals `content` when the chunker produced none.
    pub window_content: String,
    /// Provenance reference.
    pub source: Option<String>,
    /// Embedding of `content`.
    pub embedding: Vec<f32>,
}

impl NewDocument {
    /// Pairs a chunk with its embedding, defaulting the window to the content.
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        let window_content = chunk
            .window_content
            .unwrap_or_else(|| chunk.content.clone());
        Self {
            content: chunk.content,
            window_content,
            source: chunk.source,
            embedding,
        }
    }
}

/// Persisted document chunk as read back by searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Searchable chunk text.
    pub content: String,
    /// Context window returned to the caller.
    pub window_content: String,
    /// Provenance reference.
    pub source: Option<String>,
}

/// Catalogue entry as loaded from product JSON files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductListing {
    /// Merchant SKU.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Long description; this is what gets embedded.
    pub description: String,
    /// Unit price.
    pub price: f64,
    /// Product image.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Units in stock.
    #[serde(default)]
    pub stock_level: i32,
    /// Only active products are retrievable.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ProductListing {
    /// Attaches the description embedding, producing an insert payload.
    pub fn with_embedding(self, embedding: Vec<f32>) -> NewProduct {
        NewProduct {
            listing: self,
            embedding,
        }
    }
}

/// Insert payload for the products table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    /// Catalogue attributes.
    pub listing: ProductListing,
    /// Embedding of `listing.description`.
    pub embedding: Vec<f32>,
}

/// Persisted product as read back by searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Merchant SKU, used as provenance.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Long description.
    pub description: String,
    /// Unit price.
    pub price: f64,
    /// Product image.
    pub image_url: Option<String>,
    /// Units in stock.
    pub stock_level: i32,
    /// Active flag; searches never return inactive rows.
    pub is_active: bool,
}

impl Product {
    /// Materializes a stored product from its listing.
    pub fn from_listing(id: i64, listing: &ProductListing) -> Self {
        Self {
            id,
            code: listing.code.clone(),
            name: listing.name.clone(),
            description: listing.description.clone(),
            price: listing.price,
            image_url: listing.image_url.clone(),
            stock_level: listing.stock_level,
            is_active: listing.is_active,
        }
    }
}

/// Persisted entity that fusion can key on.
pub trait Record {
    /// Table-unique identifier.
    fn id(&self) -> i64;

    /// Reference a caller can cite or link back to.
    fn provenance(&self) -> Option<&str>;
}

impl Record for DocumentChunk {
    fn id(&self) -> i64 {
        self.id
    }

    fn provenance(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl Record for Product {
    fn id(&self) -> i64 {
        self.id
    }

    fn provenance(&self) -> Option<&str> {
        Some(&self.code)
    }
}

/// Query-scoped wrapper carrying the scores one search call attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<T> {
    /// The persisted record.
    #[serde(flatten)]
    pub record: T,
    /// Vector distance from the semantic leg (lower is closer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_distance: Option<f64>,
    /// Relevance from the lexical leg (higher is better).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_rank: Option<f64>,
    /// Reciprocal rank fusion score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
}

impl<T> Scored<T> {
    /// Wraps a record returned by a vector search.
    pub fn semantic(record: T, distance: f64) -> Self {
        Self {
            record,
            semantic_distance: Some(distance),
            text_rank: None,
            rrf_score: None,
        }
    }

    /// Wraps a record returned by a full-text search.
    pub fn lexical(record: T, rank: f64) -> Self {
        Self {
            record,
            semantic_distance: None,
            text_rank: Some(rank),
            rrf_score: None,
        }
    }
}

impl<T: Record> Scored<T> {
    /// Identifier of the wrapped record.
    pub fn id(&self) -> i64 {
        self.record.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_window_falls_back_to_content() {
        let chunk = Chunk {
            content: "Returns are free within 30 days.".into(),
            window_content: None,
            source: Some("faqs/returns.txt".into()),
        };
        let doc = NewDocument::from_chunk(chunk, vec![0.0; 3]);
        assert_eq!(doc.window_content, doc.content);
        assert_eq!(doc.source.as_deref(), Some("faqs/returns.txt"));
    }

    #[test]
    fn listing_defaults_to_active() {
        let listing: ProductListing = serde_json::from_str(
            r#"{"code":"SKU-1","name":"Mug","description":"Ceramic mug","price":9.5}"#,
        )
        .expect("parse listing");
        assert!(listing.is_active);
        assert_eq!(listing.stock_level, 0);
        assert_eq!(listing.image_url, None);
    }

    #[test]
    fn scored_serializes_flat_and_skips_missing_scores() {
        let doc = DocumentChunk {
            id: 7,
            content: "c".into(),
            window_content: "wc".into(),
            source: None,
        };
        let value = serde_json::to_value(Scored::lexical(doc, 0.5)).expect("serialize");
        assert_eq!(value["id"], 7);
        assert_eq!(value["text_rank"], 0.5);
        assert!(value.get("semantic_distance").is_none());
        assert!(value.get("rrf_score").is_none());
    }

    #[test]
    fn product_provenance_is_its_code() {
        let listing = ProductListing {
            code: "SKU-9".into(),
            name: "Lamp".into(),
            description: "Desk lamp".into(),
            price: 20.0,
            image_url: None,
            stock_level: 3,
            is_active: true,
        };
        let product = Product::from_listing(4, &listing);
        assert_eq!(product.provenance(), Some("SKU-9"));
        assert_eq!(product.id(), 4);
    }
}
