//! Reciprocal rank fusion.
//!
//! Each independently-ranked candidate list contributes 1/(k + rank) per
//! document (rank is 1-based within its list); a document's fused score is
//! the sum of its contributions. Appearing in only one list still yields a
//! nonzero score.

use std::collections::HashMap;

/// Merge ranked URI lists into fused scores.
pub fn rrf_merge(lists: &[&[String]], k: usize) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for list in lists {
        for (rank0, uri) in list.iter().enumerate() {
            *scores.entry(uri.clone()).or_insert(0.0) += 1.0 / (k + rank0 + 1) as f64;
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fused_scores_sum_reciprocal_ranks() {
        // Lexical [D1, D2, D3], semantic [D2, D4, D1], k = 60
        let lexical = list(&["d1", "d2", "d3"]);
        let semantic = list(&["d2", "d4", "d1"]);

        let scores = rrf_merge(&[&lexical, &semantic], 60);

        assert!((scores["d2"] - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((scores["d1"] - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        // Single-list documents still score
        assert!((scores["d3"] - 1.0 / 63.0).abs() < 1e-12);
        assert!((scores["d4"] - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn documents_in_both_lists_outrank_single_list_peers() {
        let a = list(&["x", "y", "z"]);
        let b = list(&["y", "x", "w"]);
        let scores = rrf_merge(&[&a, &b], 60);

        assert!(scores["x"] > scores["z"]);
        assert!(scores["y"] > scores["w"]);
    }

    #[test]
    fn empty_lists_yield_empty_scores() {
        let scores = rrf_merge(&[&[][..], &[][..]], 60);
        assert!(scores.is_empty());
    }
}
