//! Splits source documents into small search chunks, each paired with a
//! wider context window taken from the surrounding text.

pub mod splitter;

use tracing::{debug, warn};

use crate::config::ChunkerConfig;
use crate::models::{Chunk, SourceDocument};

pub use splitter::{RecursiveSplitter, DEFAULT_SEPARATORS};

/// Joiner placed between documents in the shared buffer.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Produces search chunks with context windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
    splitter: RecursiveSplitter,
}

impl Chunker {
    /// Builds a chunker from validated sizing.
    pub fn new(config: ChunkerConfig) -> Self {
        let splitter =
            RecursiveSplitter::new(config.small_chunk_size(), config.small_chunk_overlap());
        Self { config, splitter }
    }

    /// Sizing this chunker was built with.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks every document, preserving document order.
    ///
    /// Each chunk carries the `source_id` of the document it starts in. A
    /// chunk that cannot be located in the buffer keeps `window_content: None`.
    pub fn chunk(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        let buffer = Buffer::build(documents);
        if buffer.text.is_empty() {
            return Vec::new();
        }

        let pieces = self.splitter.split(&buffer.text);
        let mut chunks = Vec::with_capacity(pieces.len());
        let mut cursor = 0usize;

        for content in pieces {
            let source = match buffer.text[cursor..].find(content.as_str()) {
                Some(offset) => {
                    let at = cursor + offset;
                    cursor = buffer.next_boundary(at);
                    buffer.source_at(at)
                }
                None => buffer.source_at(cursor),
            };

            let window_content = match buffer.text.find(content.as_str()) {
                Some(byte_start) => Some(self.window_around(&buffer, byte_start, &content)),
                None => {
                    warn!(
                        chunk_chars = content.chars().count(),
                        source = source.unwrap_or("<unknown>"),
                        "chunk not found in source buffer; storing without a window"
                    );
                    None
                }
            };

            chunks.push(Chunk {
                source: source.map(str::to_string),
                window_content,
                content,
            });
        }

        debug!(
            documents = buffer.spans.len(),
            chunks = chunks.len(),
            "chunked documents"
        );
        chunks
    }

    fn window_around(&self, buffer: &Buffer, byte_start: usize, content: &str) -> String {
        let small = self.config.small_chunk_size();
        let window = self.config.window_size();
        let total = buffer.char_count();

        let start = buffer.char_index(byte_start);
        let end = start + content.chars().count();
        let half = (window - small) / 2;

        let mut from = start.saturating_sub(half);
        let mut to = (end + half).min(total);
        if to - from < small {
            from = end.saturating_sub(window);
            to = (start + window).min(total);
        }
        buffer.slice_chars(from, to).to_string()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

struct Span<'a> {
    start: usize,
    source_id: &'a str,
}

/// Concatenated document text plus the lookup tables chunk placement needs.
struct Buffer<'a> {
    text: String,
    spans: Vec<Span<'a>>,
    /// Byte offset of every char, followed by `text.len()`.
    char_offsets: Vec<usize>,
}

impl<'a> Buffer<'a> {
    fn build(documents: &'a [SourceDocument]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(documents.len());
        for document in documents {
            if document.content.trim().is_empty() {
                warn!(source = %document.source_id, "skipping empty document");
                continue;
            }
            if !text.is_empty() {
                text.push_str(DOCUMENT_SEPARATOR);
            }
            spans.push(Span {
                start: text.len(),
                source_id: &document.source_id,
            });
            text.push_str(&document.content);
        }
        let mut char_offsets: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        char_offsets.push(text.len());
        Self {
            text,
            spans,
            char_offsets,
        }
    }

    fn source_at(&self, byte: usize) -> Option<&'a str> {
        let idx = self.spans.partition_point(|span| span.start <= byte);
        self.spans
            .get(idx.saturating_sub(1))
            .map(|span| span.source_id)
    }

    fn char_count(&self) -> usize {
        self.char_offsets.len() - 1
    }

    fn char_index(&self, byte: usize) -> usize {
        self.char_offsets.partition_point(|&offset| offset < byte)
    }

    fn next_boundary(&self, byte: usize) -> usize {
        let idx = self.char_index(byte);
        self.char_offsets
            .get(idx + 1)
            .copied()
            .unwrap_or(self.text.len())
    }

    fn slice_chars(&self, from: usize, to: usize) -> &str {
        &self.text[self.char_offsets[from]..self.char_offsets[to]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shipping_doc() -> SourceDocument {
        SourceDocument::new(
            "Standard shipping takes three to five business days within the continental \
             United States. Expedited shipping arrives in two days for an additional fee. \
             Orders placed before noon ship the same day. International shipping is \
             available to over forty countries and typically takes seven to fourteen \
             business days depending on customs processing.",
            "faqs/shipping.txt",
        )
    }

    fn returns_doc() -> SourceDocument {
        SourceDocument::new(
            "Returns are accepted within thirty days of delivery for unused merchandise \
             in original packaging. Refunds are issued to the original payment method \
             once the warehouse inspects the item. Clearance items are final sale and \
             cannot be returned. Gift cards are never refundable.",
            "faqs/returns.txt",
        )
    }

    #[test]
    fn every_chunk_is_attributed_to_its_document() {
        let docs = vec![shipping_doc(), returns_doc()];
        let chunker = Chunker::new(ChunkerConfig::new(150, 20, 1000, 0).expect("config"));
        let chunks = chunker.chunk(&docs);
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            let source = chunk.source.as_deref().expect("source");
            let doc = docs
                .iter()
                .find(|doc| doc.source_id == source)
                .expect("known source");
            assert!(
                doc.content.contains(&chunk.content),
                "{:?} attributed to {source}",
                chunk.content
            );
        }
        assert_eq!(chunks.first().and_then(|c| c.source.as_deref()), Some("faqs/shipping.txt"));
        assert_eq!(chunks.last().and_then(|c| c.source.as_deref()), Some("faqs/returns.txt"));
    }

    fn catalogue_doc(topic: &str, items: usize) -> SourceDocument {
        let content = (1..=items)
            .map(|n| format!("{topic} item {n} ships with tracking, insurance and a printed receipt"))
            .collect::<Vec<_>>()
            .join(" ");
        SourceDocument::new(content, format!("faqs/{topic}.txt"))
    }

    #[test]
    fn chunk_count_tracks_size_minus_overlap() {
        let docs = vec![catalogue_doc("shipping", 27), catalogue_doc("returns", 27)];
        let total: usize = docs.iter().map(|doc| doc.content.chars().count()).sum::<usize>()
            + DOCUMENT_SEPARATOR.len();
        assert!(total > 3500);

        let chunks = Chunker::default().chunk(&docs);
        let estimate = total.div_ceil(150 - 20);
        assert!(
            chunks.len() * 10 >= estimate * 9 && chunks.len() * 10 <= estimate * 11,
            "{} chunks for {total} chars, expected about {estimate}",
            chunks.len()
        );
        assert!(chunks.iter().all(|chunk| chunk.content.chars().count() <= 150));

        let split = chunks
            .iter()
            .position(|chunk| chunk.source.as_deref() == Some("faqs/returns.txt"))
            .expect("returns chunks");
        assert!(chunks[..split]
            .iter()
            .all(|chunk| chunk.source.as_deref() == Some("faqs/shipping.txt")));
        assert!(chunks[split..]
            .iter()
            .all(|chunk| chunk.source.as_deref() == Some("faqs/returns.txt")));
    }

    #[test]
    fn windows_contain_their_chunk() {
        let docs = vec![shipping_doc(), returns_doc()];
        let chunker = Chunker::new(ChunkerConfig::new(60, 10, 200, 0).expect("config"));
        for chunk in chunker.chunk(&docs) {
            let window = chunk.window_content.expect("window");
            assert!(window.contains(&chunk.content));
            assert!(window.chars().count() >= chunk.content.chars().count());
            assert!(window.chars().count() <= 200);
            assert!(chunk.content.chars().count() <= 60);
        }
    }

    #[test]
    fn short_corpus_window_is_whole_buffer() {
        let docs = vec![
            SourceDocument::new("Gift wrap is free.", "a.txt"),
            SourceDocument::new("We ship worldwide.", "b.txt"),
        ];
        let chunker = Chunker::new(ChunkerConfig::new(20, 0, 1000, 0).expect("config"));
        let chunks = chunker.chunk(&docs);
        assert_eq!(chunks.len(), 2);
        for chunk in chunks {
            assert_eq!(
                chunk.window_content.as_deref(),
                Some("Gift wrap is free.\n\nWe ship worldwide.")
            );
        }
    }

    #[test]
    fn repeated_text_is_attributed_in_order() {
        let docs = vec![
            SourceDocument::new("Free shipping over $50.", "first.txt"),
            SourceDocument::new("Free shipping over $50.", "second.txt"),
        ];
        let chunker = Chunker::new(ChunkerConfig::new(30, 0, 100, 0).expect("config"));
        let sources: Vec<Option<String>> =
            chunker.chunk(&docs).into_iter().map(|c| c.source).collect();
        assert_eq!(
            sources,
            vec![Some("first.txt".to_string()), Some("second.txt".to_string())]
        );
    }

    #[test]
    fn window_equal_to_chunk_size_recenters() {
        let docs = vec![SourceDocument::new("aaaa bbbb cccc dddd eeee", "letters.txt")];
        let chunker = Chunker::new(ChunkerConfig::new(10, 0, 10, 0).expect("config"));
        let chunks = chunker.chunk(&docs);
        let middle = chunks
            .iter()
            .find(|chunk| chunk.content == "cccc dddd")
            .expect("middle chunk");
        let window = middle.window_content.as_deref().expect("window");
        assert!(window.contains("cccc dddd"));
        assert!(window.chars().count() >= 10);
    }

    #[test]
    fn empty_documents_are_skipped() {
        let docs = vec![
            SourceDocument::new("   ", "blank.txt"),
            SourceDocument::new("Only real text here.", "real.txt"),
        ];
        let chunks = Chunker::default().chunk(&docs);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source.as_deref(), Some("real.txt"));
        assert!(Chunker::default().chunk(&[]).is_empty());
    }

    #[test]
    fn multibyte_text_windows_on_char_boundaries() {
        let docs = vec![SourceDocument::new(
            "Café crème brûlée. Ünïcödé everywhere. Ñandú plush toys ship free.",
            "intl.txt",
        )];
        let chunker = Chunker::new(ChunkerConfig::new(20, 5, 30, 0).expect("config"));
        for chunk in chunker.chunk(&docs) {
            let window = chunk.window_content.expect("window");
            assert!(window.contains(&chunk.content));
        }
    }
}
