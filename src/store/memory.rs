//! In-memory backend for tests, dry runs, and offline experiments.
//!
//! Uses brute-force cosine distance for the semantic leg and a small
//! AND-of-terms matcher for the lexical leg, so orderings follow the same
//! contracts as Postgres without reproducing `ts_rank_cd` exactly.

use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{DocumentChunk, NewDocument, NewProduct, Product, Record, Scored};
use crate::store::{
    check_dimension, sanitize_text, validate_document, validate_product, ProductLookup,
    ProductTextField, RecordLookup, RecordSink, SearchBackend,
};

/// Words the lexical matcher ignores, mirroring a tsquery stop list.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "my", "of", "on", "or", "the", "to", "what", "when", "where", "which",
    "with", "you", "your",
];

struct MemoryRow<T> {
    record: T,
    embedding: Vec<f32>,
    terms: Vec<String>,
    active: bool,
}

/// Vector + text index held in a `Vec`.
pub struct MemoryStore<T> {
    dims: usize,
    text_field: ProductTextField,
    rows: Vec<MemoryRow<T>>,
}

impl<T> MemoryStore<T> {
    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether nothing has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dimension every embedding must have.
    pub fn dimensions(&self) -> usize {
        self.dims
    }

    fn next_id(&self) -> i64 {
        self.rows.len() as i64 + 1
    }
}

impl MemoryStore<DocumentChunk> {
    /// Empty document index for `dims`-dimensional embeddings.
    pub fn documents(dims: usize) -> Self {
        Self {
            dims,
            text_field: ProductTextField::default(),
            rows: Vec::new(),
        }
    }
}

impl MemoryStore<Product> {
    /// Empty product index matching text against `text_field`.
    pub fn products(dims: usize, text_field: ProductTextField) -> Self {
        Self {
            dims,
            text_field,
            rows: Vec::new(),
        }
    }
}

#[async_trait]
impl RecordSink<NewDocument> for MemoryStore<DocumentChunk> {
    async fn insert(&mut self, record: &NewDocument) -> Result<i64, StorageError> {
        validate_document(record, self.dims)?;
        let id = self.next_id();
        let content = sanitize_text(&record.content);
        self.rows.push(MemoryRow {
            terms: tokenize(&content),
            record: DocumentChunk {
                id,
                window_content: sanitize_text(&record.window_content),
                source: record.source.as_deref().map(sanitize_text),
                content,
            },
            embedding: record.embedding.clone(),
            active: true,
        });
        Ok(id)
    }
}

#[async_trait]
impl RecordSink<NewProduct> for MemoryStore<Product> {
    async fn insert(&mut self, record: &NewProduct) -> Result<i64, StorageError> {
        validate_product(record, self.dims)?;
        let id = self.next_id();
        let mut product = Product::from_listing(id, &record.listing);
        product.code = sanitize_text(&product.code);
        product.name = sanitize_text(&product.name);
        product.description = sanitize_text(&product.description);
        product.image_url = product.image_url.as_deref().map(sanitize_text);
        let text = match self.text_field {
            ProductTextField::Name => product.name.clone(),
            ProductTextField::Description => product.description.clone(),
            ProductTextField::NameAndDescription => {
                format!("{} {}", product.name, product.description)
            }
        };
        self.rows.push(MemoryRow {
            terms: tokenize(&text),
            active: product.is_active,
            record: product,
            embedding: record.embedding.clone(),
        });
        Ok(id)
    }
}

#[async_trait]
impl<T> SearchBackend<T> for MemoryStore<T>
where
    T: Record + Clone + Send + Sync,
{
    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Scored<T>>, StorageError> {
        check_dimension(self.dims, embedding)?;
        let mut hits: Vec<(&MemoryRow<T>, f64)> = self
            .rows
            .iter()
            .filter(|row| row.active)
            .map(|row| (row, cosine_distance(embedding, &row.embedding)))
            .collect();
        hits.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.record.id().cmp(&b.0.record.id()))
        });
        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|(row, distance)| Scored::semantic(row.record.clone(), distance))
            .collect())
    }

    async fn text_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<T>>, StorageError> {
        let wanted: HashSet<String> = tokenize(query).into_iter().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<(&MemoryRow<T>, f64)> = self
            .rows
            .iter()
            .filter(|row| row.active)
            .filter_map(|row| text_rank(&wanted, &row.terms).map(|rank| (row, rank)))
            .collect();
        hits.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.record.id().cmp(&b.0.record.id()),
            other => other,
        });
        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|(row, rank)| Scored::lexical(row.record.clone(), rank))
            .collect())
    }
}

#[async_trait]
impl<T> RecordLookup<T> for MemoryStore<T>
where
    T: Record + Clone + Send + Sync,
{
    async fn get_by_id(&self, id: i64) -> Result<Option<T>, StorageError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.active && row.record.id() == id)
            .map(|row| row.record.clone()))
    }
}

#[async_trait]
impl ProductLookup for MemoryStore<Product> {
    async fn get_by_code(&self, code: &str) -> Result<Option<Product>, StorageError> {
        let code = code.trim();
        Ok(self
            .rows
            .iter()
            .find(|row| row.active && row.record.code == code)
            .map(|row| row.record.clone()))
    }
}

/// Lowercased alphanumeric terms with stop words removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Matches only when every query term occurs; rank is the share of the
/// row's terms that are query terms.
fn text_rank(wanted: &HashSet<String>, terms: &[String]) -> Option<f64> {
    if terms.is_empty() {
        return None;
    }
    let mut found = HashSet::new();
    let mut hits = 0usize;
    for term in terms {
        if wanted.contains(term) {
            hits += 1;
            found.insert(term.as_str());
        }
    }
    if found.len() < wanted.len() {
        return None;
    }
    Some(hits as f64 / terms.len() as f64)
}

/// `1 - cosine_similarity`, matching pgvector's `<=>` operator.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductListing;
    use pretty_assertions::assert_eq;

    fn new_doc(content: &str, embedding: Vec<f32>) -> NewDocument {
        NewDocument {
            content: content.into(),
            window_content: content.into(),
            source: Some("faq.txt".into()),
            embedding,
        }
    }

    fn listing(code: &str, description: &str, is_active: bool) -> ProductListing {
        ProductListing {
            code: code.into(),
            name: format!("{code} name"),
            description: description.into(),
            price: 10.0,
            image_url: None,
            stock_level: 5,
            is_active,
        }
    }

    #[test]
    fn cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn vector_search_orders_by_ascending_distance() {
        let mut store = MemoryStore::documents(2);
        store
            .insert_batch(&[
                new_doc("far", vec![0.0, 1.0]),
                new_doc("close", vec![1.0, 0.05]),
                new_doc("middle", vec![1.0, 1.0]),
            ])
            .await
            .expect("insert");
        let hits = store.vector_search(&[1.0, 0.0], 2).await.expect("search");
        let contents: Vec<&str> = hits.iter().map(|h| h.record.content.as_str()).collect();
        assert_eq!(contents, vec!["close", "middle"]);
        assert!(hits[0].semantic_distance < hits[1].semantic_distance);
        assert_eq!(hits[0].text_rank, None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn text_search_requires_every_term() {
        let mut store = MemoryStore::documents(2);
        store
            .insert_batch(&[
                new_doc("Returns are free for damaged items", vec![1.0, 0.0]),
                new_doc("Shipping is free over fifty dollars", vec![0.0, 1.0]),
                new_doc("Free free free shipping", vec![1.0, 1.0]),
            ])
            .await
            .expect("insert");
        let hits = store.text_search("free shipping", 10).await.expect("search");
        let ids: Vec<i64> = hits.iter().map(Scored::id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(store.text_search("the and of", 10).await.expect("search").is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn inactive_products_never_surface() {
        let mut store = MemoryStore::products(2, ProductTextField::Description);
        store
            .insert(&listing("ON", "ceramic coffee mug", true).with_embedding(vec![1.0, 0.0]))
            .await
            .expect("insert");
        store
            .insert(&listing("OFF", "ceramic coffee mug", false).with_embedding(vec![1.0, 0.0]))
            .await
            .expect("insert");
        let semantic = store.vector_search(&[1.0, 0.0], 10).await.expect("vector");
        let lexical = store.text_search("coffee mug", 10).await.expect("text");
        assert_eq!(semantic.len(), 1);
        assert_eq!(lexical.len(), 1);
        assert_eq!(semantic[0].record.code, "ON");
        assert_eq!(lexical[0].record.code, "ON");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lookups_hide_inactive_products() {
        let mut store = MemoryStore::products(2, ProductTextField::Description);
        let on = store
            .insert(&listing("MUG-1", "ceramic coffee mug", true).with_embedding(vec![1.0, 0.0]))
            .await
            .expect("insert");
        let off = store
            .insert(&listing("MUG-0", "retired mug", false).with_embedding(vec![0.0, 1.0]))
            .await
            .expect("insert");

        let by_id = store.get_by_id(on).await.expect("lookup").expect("active product");
        assert_eq!(by_id.code, "MUG-1");
        let by_code = store.get_by_code(" MUG-1 ").await.expect("lookup").expect("by code");
        assert_eq!(by_code.id, on);
        assert_eq!(store.get_by_id(off).await.expect("lookup"), None);
        assert_eq!(store.get_by_code("MUG-0").await.expect("lookup"), None);
        assert_eq!(store.get_by_code("MUG-404").await.expect("lookup"), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn documents_are_found_by_id() {
        let mut store = MemoryStore::documents(2);
        let ids = store
            .insert_batch(&[new_doc("first", vec![1.0, 0.0]), new_doc("second", vec![0.0, 1.0])])
            .await
            .expect("insert");
        let second = store.get_by_id(ids[1]).await.expect("lookup").expect("document");
        assert_eq!(second.content, "second");
        assert_eq!(second.source.as_deref(), Some("faq.txt"));
        assert_eq!(store.get_by_id(99).await.expect("lookup"), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejects_wrong_dimension() {
        let mut store = MemoryStore::documents(3);
        let err = store
            .insert(&new_doc("short vector", vec![1.0]))
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(err, StorageError::DimensionMismatch { .. }));
        assert!(store.is_empty());
        assert!(store.vector_search(&[1.0], 1).await.is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn product_text_fields_are_stripped_of_nul_bytes() {
        let mut store = MemoryStore::products(2, ProductTextField::Description);
        let mut raw = listing("SKU\0-9", "enamel\0 camp mug", true);
        raw.name = "Camp\0 mug".into();
        raw.image_url = Some("https://cdn.example/\0mug.png".into());
        store
            .insert(&raw.with_embedding(vec![1.0, 0.0]))
            .await
            .expect("insert");
        let hits = store.text_search("camp", 1).await.expect("text");
        let hit = &hits[0].record;
        assert_eq!(hit.code, "SKU-9");
        assert_eq!(hit.name, "Camp mug");
        assert_eq!(hit.description, "enamel camp mug");
        assert_eq!(hit.image_url.as_deref(), Some("https://cdn.example/mug.png"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn name_field_matches_product_names() {
        let mut store = MemoryStore::products(2, ProductTextField::Name);
        store
            .insert(&listing("LAMP", "bright desk light", true).with_embedding(vec![0.0, 1.0]))
            .await
            .expect("insert");
        assert_eq!(store.text_search("lamp", 5).await.expect("text").len(), 1);
        assert!(store.text_search("desk", 5).await.expect("text").is_empty());
    }
}
