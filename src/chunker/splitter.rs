//! Recursive separator-based text splitter.
//!
//! Text is split on the coarsest separator present, pieces that still exceed
//! the chunk size are split again with the next separator, and the resulting
//! pieces are greedily merged back up to the chunk size with a tail overlap.
//! Separators stay attached to the start of the piece that follows them, so
//! every merged chunk is a literal span of the input (before trimming).

use std::collections::VecDeque;

/// Paragraph, line, sentence endings, then words.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// Splits text into chunks of at most `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

impl RecursiveSplitter {
    /// Builds a splitter using [`DEFAULT_SEPARATORS`].
    ///
    /// Sizes are in characters; the overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS,
        }
    }

    /// Splits `text` into trimmed, non-empty chunks in document order.
    ///
    /// A chunk exceeds `chunk_size` only when it is a single piece that none of
    /// the separators can break further.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, self.separators)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let (separator, finer) = pick_separator(text, separators);
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut merged, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some((_, front_len)) = window.pop_front() else {
                        break;
                    };
                    total -= front_len;
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        push_joined(&mut merged, &window);
        merged
    }
}

fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (idx, separator) in separators.iter().enumerate() {
        if text.contains(separator) {
            return (separator, &separators[idx + 1..]);
        }
    }
    (separators.last().copied().unwrap_or(""), &[])
}

fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return vec![text];
    }
    let mut pieces = Vec::new();
    let mut last = 0usize;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(&text[last..idx]);
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(&text[last..]);
    }
    pieces
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = RecursiveSplitter::new(150, 20);
        assert_eq!(splitter.split("  Shipping takes 3 days.  "), vec!["Shipping takes 3 days."]);
    }

    #[test]
    fn paragraphs_win_over_finer_separators() {
        let splitter = RecursiveSplitter::new(20, 0);
        let chunks = splitter.split("Orders ship daily.\n\nReturns are free.");
        assert_eq!(chunks, vec!["Orders ship daily.", "Returns are free."]);
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let splitter = RecursiveSplitter::new(10, 5);
        let chunks = splitter.split("aaaa bbbb cccc dddd eeee");
        assert_eq!(
            chunks,
            vec!["aaaa bbbb", "bbbb cccc", "cccc dddd", "dddd eeee"]
        );
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(40);
        let splitter = RecursiveSplitter::new(150, 20);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 10);
        assert!(chunks.iter().all(|chunk| char_len(chunk) <= 150));
    }

    #[test]
    fn indivisible_token_may_exceed_size() {
        let splitter = RecursiveSplitter::new(5, 0);
        let chunks = splitter.split("a supercalifragilistic b");
        assert_eq!(chunks, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn sizes_count_characters_not_bytes() {
        let splitter = RecursiveSplitter::new(6, 0);
        let chunks = splitter.split("ñññññ ñññññ");
        assert_eq!(chunks, vec!["ñññññ", "ñññññ"]);
    }

    #[test]
    fn keeps_separator_with_following_piece() {
        assert_eq!(
            split_keep_separator("a\n\n\n\nb", "\n\n"),
            vec!["a", "\n\n", "\n\nb"]
        );
    }

    #[test]
    fn chunks_are_literal_spans_of_input() {
        let text = "Is shipping free? Yes! Orders over $50 ship free. Others pay a flat fee.\nSee terms.";
        let splitter = RecursiveSplitter::new(25, 8);
        for chunk in splitter.split(text) {
            assert!(text.contains(&chunk), "chunk {chunk:?} not found in input");
        }
    }
}
