//! Reciprocal Rank Fusion: score(id) = Σ 1 / (k + rank + 1)
//!
//! Merges ranked id lists without comparing their raw distances, which is what
//! makes lists retrieved for different paraphrases combinable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Smoothing constant; larger values flatten the advantage of top ranks
pub const DEFAULT_RRF_K: u32 = 60;

/// One fused id and its accumulated score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedEntry {
    pub id: u32,
    pub score: f64,
}

/// Ids ordered by descending fused score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedRanking {
    pub entries: Vec<FusedEntry>,
}

impl FusedRanking {
    pub fn ids(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FusedEntry> {
        self.entries.iter()
    }

    /// Score of `id`, if it appeared in any input list
    pub fn score_of(&self, id: u32) -> Option<f64> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.score)
    }
}

/// Fuse ranked id lists
///
/// The item at 0-based rank `r` of any list adds `1 / (k + r + 1)` to its id's
/// score; an id repeated within one list contributes at each position. Equal
/// scores keep the order in which ids were first encountered, scanning the
/// lists in order, so the result is deterministic and never tie-broken by id.
///
/// # Example
///
/// ```
/// use grove_core::retrieval::fusion::reciprocal_rank_fusion;
///
/// let fused = reciprocal_rank_fusion(&[vec![1, 2, 3], vec![3, 1]], 60);
/// assert_eq!(fused.ids(), vec![1, 3, 2]);
/// ```
pub fn reciprocal_rank_fusion<L: AsRef<[u32]>>(lists: &[L], k: u32) -> FusedRanking {
    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut entries: Vec<FusedEntry> = Vec::new();

    for list in lists {
        for (rank, &id) in list.as_ref().iter().enumerate() {
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
            let slot = *slots.entry(id).or_insert_with(|| {
                entries.push(FusedEntry { id, score: 0.0 });
                entries.len() - 1
            });
            entries[slot].score += contribution;
        }
    }

    // Stable: ties stay in first-encounter order
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    FusedRanking { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_worked_example() {
        // id 1: 1/61 + 1/62, id 3: 1/63 + 1/61, id 2: 1/62
        let fused = reciprocal_rank_fusion(&[vec![1, 2, 3], vec![3, 1]], 60);
        assert_eq!(fused.ids(), vec![1, 3, 2]);

        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused.score_of(1).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ties_keep_first_encounter_order() {
        let fused = reciprocal_rank_fusion(&[vec![9], vec![4]], 60);
        assert_eq!(fused.ids(), vec![9, 4]);

        let fused = reciprocal_rank_fusion(&[vec![4, 9], vec![9, 4]], 60);
        assert_eq!(fused.ids(), vec![4, 9]);
    }

    #[test]
    fn test_duplicates_within_a_list_count_twice() {
        let fused = reciprocal_rank_fusion(&[vec![5, 5]], 0);
        assert_eq!(fused.len(), 1);
        assert!((fused.entries[0].score - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_inputs() {
        let none: [Vec<u32>; 0] = [];
        assert!(reciprocal_rank_fusion(&none, 60).is_empty());
        assert!(reciprocal_rank_fusion(&[Vec::<u32>::new()], 60).is_empty());
    }

    fn distinct_ids() -> impl Strategy<Value = Vec<u32>> {
        proptest::collection::hash_set(0u32..500, 0..40).prop_map(|set| set.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_single_list_is_preserved(list in distinct_ids(), k in 0u32..200) {
            let fused = reciprocal_rank_fusion(&[list.clone()], k);
            prop_assert_eq!(fused.ids(), list);
        }

        #[test]
        fn prop_scores_descend_and_ids_unique(
            lists in proptest::collection::vec(proptest::collection::vec(0u32..50, 0..20), 0..6),
            k in 0u32..100,
        ) {
            let fused = reciprocal_rank_fusion(&lists, k);
            for pair in fused.entries.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            let mut ids = fused.ids();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), fused.len());

            let mut expected: Vec<u32> = lists.iter().flatten().copied().collect();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(ids, expected);
        }

        #[test]
        fn prop_extra_list_never_lowers_a_score(
            lists in proptest::collection::vec(distinct_ids(), 1..5),
            extra in distinct_ids(),
        ) {
            let before = reciprocal_rank_fusion(&lists, DEFAULT_RRF_K);
            let mut more = lists.clone();
            more.push(extra);
            let after = reciprocal_rank_fusion(&more, DEFAULT_RRF_K);

            for entry in before.iter() {
                let later = after.score_of(entry.id).unwrap();
                prop_assert!(later >= entry.score);
            }
        }

        #[test]
        fn prop_fusing_a_list_with_itself_keeps_order(list in distinct_ids()) {
            let fused = reciprocal_rank_fusion(&[list.clone(), list.clone()], DEFAULT_RRF_K);
            prop_assert_eq!(fused.ids(), list);
        }
    }
}
