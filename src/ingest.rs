//! Offline ingestion: embed prepared records in batches and hand them to a
//! [`RecordSink`].

use serde::Serialize;
use tracing::{info, warn};

use crate::embedder::{check_dimensions, EmbeddingProvider};
use crate::error::{EmbeddingError, IngestError};
use crate::models::{Chunk, NewDocument, NewProduct, ProductListing};
use crate::store::{sanitize_text, RecordSink};

/// Counts from one ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records handed to the pipeline.
    pub received: usize,
    /// Records persisted.
    pub inserted: usize,
    /// Records dropped before embedding: empty text after sanitising, or a
    /// product without a code or with an unusable price.
    pub skipped: usize,
}

/// Embeds chunk contents and inserts them as documents.
pub async fn ingest_documents<S>(
    chunks: Vec<Chunk>,
    embedder: &dyn EmbeddingProvider,
    sink: &mut S,
    batch_size: usize,
) -> Result<IngestReport, IngestError>
where
    S: RecordSink<NewDocument> + ?Sized,
{
    let mut report = IngestReport {
        received: chunks.len(),
        ..IngestReport::default()
    };
    let mut prepared = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let content = sanitize_text(&chunk.content).trim().to_string();
        if content.is_empty() {
            warn!(source = chunk.source.as_deref().unwrap_or("<unknown>"), "skipping empty chunk");
            report.skipped += 1;
            continue;
        }
        prepared.push(Chunk {
            content,
            window_content: chunk.window_content.as_deref().map(sanitize_text),
            source: chunk.source,
        });
    }

    for batch in prepared.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = embed_all(embedder, &texts).await?;
        let records: Vec<NewDocument> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewDocument::from_chunk(chunk, embedding))
            .collect();
        let ids = sink.insert_batch(&records).await?;
        report.inserted += ids.len();
        info!(
            inserted = report.inserted,
            pending = prepared.len() - report.inserted,
            "document batch stored"
        );
    }
    Ok(report)
}

/// Embeds product descriptions and inserts the listings.
pub async fn ingest_products<S>(
    listings: Vec<ProductListing>,
    embedder: &dyn EmbeddingProvider,
    sink: &mut S,
    batch_size: usize,
) -> Result<IngestReport, IngestError>
where
    S: RecordSink<NewProduct> + ?Sized,
{
    let mut report = IngestReport {
        received: listings.len(),
        ..IngestReport::default()
    };
    let mut prepared = Vec::with_capacity(listings.len());
    for mut listing in listings {
        listing.code = sanitize_text(&listing.code).trim().to_string();
        listing.description = sanitize_text(&listing.description).trim().to_string();
        let problem = if listing.code.is_empty() {
            Some("missing code")
        } else if listing.description.is_empty() {
            Some("missing description")
        } else if !listing.price.is_finite() {
            Some("non-finite price")
        } else {
            None
        };
        if let Some(problem) = problem {
            warn!(code = %listing.code, name = %listing.name, problem, "skipping product");
            report.skipped += 1;
            continue;
        }
        prepared.push(listing);
    }

    for batch in prepared.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|listing| listing.description.clone())
            .collect();
        let embeddings = embed_all(embedder, &texts).await?;
        let records: Vec<NewProduct> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(listing, embedding)| listing.with_embedding(embedding))
            .collect();
        let ids = sink.insert_batch(&records).await?;
        report.inserted += ids.len();
        info!(
            inserted = report.inserted,
            pending = prepared.len() - report.inserted,
            "product batch stored"
        );
    }
    Ok(report)
}

async fn embed_all(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let embeddings = embedder.embed_batch(texts).await?;
    if embeddings.len() != texts.len() {
        return Err(EmbeddingError::Malformed(format!(
            "received {} embeddings for {} inputs",
            embeddings.len(),
            texts.len()
        )));
    }
    check_dimensions(embedder.dimensions(), &embeddings)?;
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use crate::models::{DocumentChunk, Product};
    use crate::store::{MemoryStore, ProductTextField, SearchBackend};

    fn chunk(content: &str, window: Option<&str>) -> Chunk {
        Chunk {
            content: content.into(),
            window_content: window.map(str::to_string),
            source: Some("faq.txt".into()),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn documents_are_sanitised_and_batched() {
        let embedder = HashingEmbedder::new(32).expect("embedder");
        let mut store: MemoryStore<DocumentChunk> = MemoryStore::documents(32);
        let report = ingest_documents(
            vec![
                chunk("Returns within 30 days\0", Some("Policy: Returns within 30 days")),
                chunk(" \0 ", None),
                chunk("Free shipping over $50", None),
                chunk("Gift cards never expire", None),
            ],
            &embedder,
            &mut store,
            2,
        )
        .await
        .expect("ingest");
        assert_eq!(
            report,
            IngestReport {
                received: 4,
                inserted: 3,
                skipped: 1
            }
        );

        let hits = store.text_search("shipping", 5).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.window_content, "Free shipping over $50");
        let first = store.text_search("returns", 5).await.expect("search");
        assert_eq!(first[0].record.content, "Returns within 30 days");
        assert_eq!(first[0].record.window_content, "Policy: Returns within 30 days");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn products_without_description_are_skipped() {
        let embedder = HashingEmbedder::new(16).expect("embedder");
        let mut store: MemoryStore<Product> =
            MemoryStore::products(16, ProductTextField::Description);
        let listing = |code: &str, description: &str| ProductListing {
            code: code.into(),
            name: code.into(),
            description: description.into(),
            price: 1.0,
            image_url: None,
            stock_level: 1,
            is_active: true,
        };
        let report = ingest_products(
            vec![listing("A", "linen shirt"), listing("B", "   ")],
            &embedder,
            &mut store,
            8,
        )
        .await
        .expect("ingest");
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unusable_catalogue_rows_are_skipped_not_fatal() {
        let embedder = HashingEmbedder::new(16).expect("embedder");
        let mut store: MemoryStore<Product> =
            MemoryStore::products(16, ProductTextField::Description);
        let listing = |code: &str, description: &str, price: f64| ProductListing {
            code: code.into(),
            name: format!("{description} listing"),
            description: description.into(),
            price,
            image_url: None,
            stock_level: 3,
            is_active: true,
        };
        let report = ingest_products(
            vec![
                listing("A", "good mug", 9.0),
                listing(" \0", "orphan row", 9.0),
                listing("B", "priceless mug", f64::NAN),
                listing("C", "other mug", 11.0),
            ],
            &embedder,
            &mut store,
            8,
        )
        .await
        .expect("bad rows do not abort the run");
        assert_eq!(
            report,
            IngestReport {
                received: 4,
                inserted: 2,
                skipped: 2
            }
        );
        let codes: Vec<String> = store
            .text_search("mug", 10)
            .await
            .expect("search")
            .into_iter()
            .map(|hit| hit.record.code)
            .collect();
        assert_eq!(codes, vec!["A", "C"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dimension_mismatch_stops_ingestion() {
        let embedder = HashingEmbedder::new(8).expect("embedder");
        let mut store: MemoryStore<DocumentChunk> = MemoryStore::documents(16);
        let err = ingest_documents(vec![chunk("hello there", None)], &embedder, &mut store, 4)
            .await
            .expect_err("store rejects 8-d vectors");
        assert!(matches!(err, IngestError::Storage(_)));
        assert!(store.is_empty());
    }
}
