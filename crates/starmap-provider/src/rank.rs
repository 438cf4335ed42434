//! Neighbor ranking.
//!
//! Total order: ascending relevance rank (unranked after every ranked
//! candidate), then descending score, then discovery order, then title.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Secondary relevance signal for one title.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relevance {
    pub rank: usize,
    pub score: f64,
}

#[derive(Debug)]
struct Scored<'a> {
    title: &'a str,
    index: usize,
    rank: Option<usize>,
    score: f64,
}

fn compare(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    let by_rank = match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_rank
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.index.cmp(&b.index))
        .then_with(|| a.title.cmp(b.title))
}

/// Drop duplicates and `center`, keeping first-discovery order.
pub fn dedupe_candidates<I, S>(center: &str, titles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    titles
        .into_iter()
        .map(Into::into)
        .filter(|t| t != center && seen.insert(t.clone()))
        .collect()
}

/// Order `candidates` (in discovery order) and keep the first `limit`.
pub fn rank_neighbors(
    candidates: &[String],
    relevance: &HashMap<String, Relevance>,
    limit: usize,
) -> Vec<String> {
    let mut scored: Vec<Scored<'_>> = candidates
        .iter()
        .enumerate()
        .map(|(index, title)| {
            let r = relevance.get(title);
            Scored {
                title,
                index,
                rank: r.map(|r| r.rank),
                score: r.map_or(0.0, |r| r.score),
            }
        })
        .collect();
    scored.sort_by(compare);
    scored
        .into_iter()
        .take(limit)
        .map(|s| s.title.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn titles(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ranked_before_unranked() {
        let candidates = titles(&["a", "b", "c", "d"]);
        let mut rel = HashMap::new();
        rel.insert("d".to_string(), Relevance { rank: 0, score: 1.0 });
        rel.insert("b".to_string(), Relevance { rank: 1, score: 9.0 });
        assert_eq!(rank_neighbors(&candidates, &rel, 10), titles(&["d", "b", "a", "c"]));
    }

    #[test]
    fn score_breaks_rank_ties() {
        let candidates = titles(&["a", "b"]);
        let mut rel = HashMap::new();
        rel.insert("a".to_string(), Relevance { rank: 3, score: 1.0 });
        rel.insert("b".to_string(), Relevance { rank: 3, score: 2.0 });
        assert_eq!(rank_neighbors(&candidates, &rel, 10), titles(&["b", "a"]));
    }

    #[test]
    fn discovery_order_for_unranked() {
        let candidates = titles(&["zeta", "alpha", "mid"]);
        assert_eq!(
            rank_neighbors(&candidates, &HashMap::new(), 2),
            titles(&["zeta", "alpha"])
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let candidates: Vec<String> = (0..50).map(|i| format!("T{}", (i * 7) % 50)).collect();
        let rel: HashMap<String, Relevance> = (0..50)
            .step_by(3)
            .map(|i| (format!("T{i}"), Relevance { rank: i % 5, score: (i % 4) as f64 }))
            .collect();
        let first = rank_neighbors(&candidates, &rel, 20);
        for _ in 0..5 {
            assert_eq!(rank_neighbors(&candidates, &rel, 20), first);
        }
    }

    #[test]
    fn dedupe_drops_center_and_repeats() {
        let out = dedupe_candidates("Hub", ["A", "Hub", "B", "A", "C"]);
        assert_eq!(out, titles(&["A", "B", "C"]));
    }
}
