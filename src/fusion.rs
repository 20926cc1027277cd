//! Reciprocal Rank Fusion.
//!
//! `score(d) = Σ 1 / (k + position + 1)` over every list `d` appears in, with
//! 0-based positions. Only ranks matter; the legs' raw scores are carried
//! through for display but never enter the fused score.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigurationError;
use crate::models::{Record, Scored};

/// Conventional RRF constant (Cormack et al., SIGIR 2009).
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Fusion engine parameterised by `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFusion {
    k: f64,
}

impl RankFusion {
    /// Builds a fusion engine; `k` must be finite and non-negative.
    pub fn new(k: f64) -> Result<Self, ConfigurationError> {
        if !k.is_finite() || k < 0.0 {
            return Err(ConfigurationError::InvalidRrfK(k));
        }
        Ok(Self { k })
    }

    /// The configured constant.
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Score contributed by an item at 0-based `position` of one list.
    pub fn contribution(&self, position: usize) -> f64 {
        1.0 / (self.k + position as f64 + 1.0)
    }

    /// Fuses the semantic and lexical legs of a hybrid search into at most
    /// `top_k` results carrying `rrf_score` and whichever leg scores applied.
    ///
    /// Equal scores keep first-seen order, semantic leg first. An id repeated
    /// within one leg only counts at its first position.
    pub fn fuse<T: Record>(
        &self,
        semantic: Vec<Scored<T>>,
        lexical: Vec<Scored<T>>,
        top_k: usize,
    ) -> Vec<Scored<T>> {
        let mut slots: HashMap<i64, usize> = HashMap::new();
        let mut fused: Vec<(Scored<T>, f64)> = Vec::with_capacity(semantic.len() + lexical.len());

        for list in [semantic, lexical] {
            let mut seen = HashSet::new();
            for (position, item) in list.into_iter().enumerate() {
                let id = item.id();
                if !seen.insert(id) {
                    continue;
                }
                let contribution = self.contribution(position);
                match slots.get(&id) {
                    Some(&slot) => {
                        let (existing, score) = &mut fused[slot];
                        *score += contribution;
                        existing.semantic_distance =
                            existing.semantic_distance.or(item.semantic_distance);
                        existing.text_rank = existing.text_rank.or(item.text_rank);
                    }
                    None => {
                        slots.insert(id, fused.len());
                        fused.push((item, contribution));
                    }
                }
            }
        }

        fused.sort_by(|a, b| b.1.total_cmp(&a.1));
        fused.truncate(top_k);
        fused
            .into_iter()
            .map(|(mut item, score)| {
                item.rrf_score = Some(score);
                item
            })
            .collect()
    }
}

impl Default for RankFusion {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use pretty_assertions::assert_eq;

    fn doc(id: i64) -> DocumentChunk {
        DocumentChunk {
            id,
            content: format!("chunk {id}"),
            window_content: format!("window {id}"),
            source: None,
        }
    }

    fn semantic(ids: &[i64]) -> Vec<Scored<DocumentChunk>> {
        ids.iter()
            .enumerate()
            .map(|(pos, &id)| Scored::semantic(doc(id), 0.1 * (pos as f64 + 1.0)))
            .collect()
    }

    fn lexical(ids: &[i64]) -> Vec<Scored<DocumentChunk>> {
        ids.iter()
            .enumerate()
            .map(|(pos, &id)| Scored::lexical(doc(id), 1.0 / (pos as f64 + 1.0)))
            .collect()
    }

    fn ids(results: &[Scored<DocumentChunk>]) -> Vec<i64> {
        results.iter().map(Scored::id).collect()
    }

    #[test]
    fn shared_items_rank_first_with_first_seen_tiebreak() {
        let fusion = RankFusion::default();
        let fused = fusion.fuse(semantic(&[10, 20, 30]), lexical(&[20, 10, 40]), 3);
        assert_eq!(ids(&fused), vec![10, 20, 30]);

        let both = 1.0 / 61.0 + 1.0 / 62.0;
        assert_eq!(fused[0].rrf_score, Some(both));
        assert_eq!(fused[1].rrf_score, Some(both));
        assert_eq!(fused[2].rrf_score, Some(1.0 / 63.0));
    }

    #[test]
    fn merged_results_keep_both_leg_scores() {
        let fused = RankFusion::default().fuse(semantic(&[1, 2]), lexical(&[2, 3]), 10);
        let two = fused.iter().find(|item| item.id() == 2).expect("id 2");
        assert!(two.semantic_distance.is_some());
        assert!(two.text_rank.is_some());
        let three = fused.iter().find(|item| item.id() == 3).expect("id 3");
        assert_eq!(three.semantic_distance, None);
    }

    #[test]
    fn disjoint_lists_interleave_with_equal_head_scores() {
        let fused = RankFusion::default().fuse(
            semantic(&[1, 2, 3, 4, 5]),
            lexical(&[6, 7, 8, 9, 10]),
            5,
        );
        assert_eq!(fused.len(), 5);
        assert_eq!(ids(&fused), vec![1, 6, 2, 7, 3]);
        assert_eq!(fused[0].rrf_score, Some(1.0 / 61.0));
        assert_eq!(fused[1].rrf_score, Some(1.0 / 61.0));
    }

    #[test]
    fn appearing_in_both_lists_never_hurts() {
        let fusion = RankFusion::default();
        let alone = fusion.fuse(semantic(&[1, 2, 3]), lexical(&[4, 5, 6]), 10);
        let boosted = fusion.fuse(semantic(&[1, 2, 3]), lexical(&[4, 3, 6]), 10);
        let score = |fused: &[Scored<DocumentChunk>], id: i64| {
            fused
                .iter()
                .find(|item| item.id() == id)
                .and_then(|item| item.rrf_score)
                .unwrap_or_default()
        };
        assert!(score(&boosted, 3) > score(&alone, 3));
        assert_eq!(boosted[0].id(), 3);
        assert_eq!(boosted.len(), 5);
    }

    #[test]
    fn duplicates_within_a_leg_count_once() {
        let fused = RankFusion::default().fuse(semantic(&[7, 7, 8]), lexical(&[8, 8]), 10);
        assert_eq!(ids(&fused), vec![8, 7]);
        assert_eq!(fused[0].rrf_score, Some(1.0 / 63.0 + 1.0 / 61.0));
        assert_eq!(fused[1].rrf_score, Some(1.0 / 61.0));
        // The first occurrence supplies the carried leg score.
        assert_eq!(fused[1].semantic_distance, Some(0.1));
        assert_eq!(fused[0].text_rank, Some(1.0));
    }

    #[test]
    fn output_is_bounded_by_top_k() {
        let fusion = RankFusion::default();
        assert!(fusion.fuse(semantic(&[1, 2, 3]), lexical(&[4, 5]), 0).is_empty());
        assert_eq!(fusion.fuse(semantic(&[1, 2, 3]), lexical(&[4, 5]), 4).len(), 4);
        assert_eq!(fusion.fuse(semantic(&[1]), Vec::new(), 4).len(), 1);
    }

    #[test]
    fn rejects_unusable_k() {
        assert_eq!(RankFusion::new(-1.0), Err(ConfigurationError::InvalidRrfK(-1.0)));
        assert!(RankFusion::new(f64::INFINITY).is_err());
        assert!(RankFusion::new(f64::NAN).is_err());
        assert_eq!(RankFusion::new(0.0).map(|f| f.contribution(0)), Ok(1.0));
    }
}
