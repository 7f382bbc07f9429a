use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::types::{DocumentScore, DocumentTag, TagFilter};

/// Sums `filter.weight * association weight` per document over every tag of
/// every filter. A tag listed by several filters contributes once per filter.
pub fn accumulate_scores(filters: &[TagFilter], associations: &HashMap<i64, Vec<DocumentTag>>) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for filter in filters {
        for tag_id in &filter.tag_ids {
            let Some(tagged) = associations.get(tag_id) else { continue };
            for assoc in tagged {
                *scores.entry(assoc.document_id.clone()).or_insert(0.0) += filter.weight * assoc.effective_weight();
            }
        }
    }
    scores
}

/// Heap entry ordered so that `Greater` means "ranks ahead": higher score,
/// then smaller document id.
#[derive(Debug, PartialEq)]
struct Ranked(DocumentScore);

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.score.total_cmp(&other.0.score).then_with(|| other.0.document_id.cmp(&self.0.document_id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `limit` best documents, best first. Non-finite scores are dropped
/// before ranking.
pub fn top_k(scores: HashMap<String, f64>, limit: usize) -> Vec<DocumentScore> {
    if limit == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(limit + 1);
    for (document_id, score) in scores {
        if !score.is_finite() {
            continue;
        }
        heap.push(Reverse(Ranked(DocumentScore { document_id, score })));
        if heap.len() > limit {
            heap.pop();
        }
    }
    heap.into_sorted_vec().into_iter().map(|Reverse(Ranked(d))| d).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterOperator;

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    fn ids(ranked: &[DocumentScore]) -> Vec<&str> {
        ranked.iter().map(|d| d.document_id.as_str()).collect()
    }

    #[test]
    fn highest_scores_come_first() {
        let ranked = top_k(scores(&[("a", 1.0), ("b", 5.0), ("c", 3.0), ("d", 4.0), ("e", 2.0)]), 3);
        assert_eq!(ids(&ranked), vec!["b", "d", "c"]);
    }

    #[test]
    fn ties_break_by_document_id() {
        let ranked = top_k(scores(&[("z", 1.0), ("m", 1.0), ("a", 1.0)]), 2);
        assert_eq!(ids(&ranked), vec!["a", "m"]);
    }

    #[test]
    fn non_finite_scores_never_surface() {
        let ranked = top_k(scores(&[("nan", f64::NAN), ("inf", f64::INFINITY), ("neg", f64::NEG_INFINITY), ("ok", 0.5)]), 10);
        assert_eq!(ids(&ranked), vec!["ok"]);
    }

    #[test]
    fn limit_larger_than_input_returns_all_sorted() {
        let ranked = top_k(scores(&[("a", 1.0), ("b", 2.0)]), 20);
        assert_eq!(ids(&ranked), vec!["b", "a"]);
        assert!(top_k(scores(&[("a", 1.0)]), 0).is_empty());
    }

    #[test]
    fn shared_tags_accumulate_per_filter() {
        let filters = vec![
            TagFilter { tag_category_id: 1, tag_ids: vec![10], operator: FilterOperator::And, weight: 2.0 },
            TagFilter { tag_category_id: 2, tag_ids: vec![10, 11], operator: FilterOperator::Or, weight: 0.5 },
        ];
        let associations = HashMap::from([
            (10, vec![DocumentTag { document_id: "x".into(), tag_id: 10, weight: Some(3.0) }]),
            (11, vec![DocumentTag { document_id: "x".into(), tag_id: 11, weight: None }, DocumentTag { document_id: "y".into(), tag_id: 11, weight: None }]),
        ]);
        let s = accumulate_scores(&filters, &associations);
        // x: 2*3 + 0.5*3 + 0.5*1
        assert!((s["x"] - 8.0).abs() < 1e-9);
        assert!((s["y"] - 0.5).abs() < 1e-9);
    }
}
