//! Fixed-capacity recall buffer with cosine-similarity context lookup
//!
//! Holds the most recent lines with their term-frequency vectors. Queries
//! scan the whole ring; with the default capacity of 2048 that is cheap
//! relative to scoring.

use std::collections::VecDeque;

use ahash::AHashMap;
use serde::Serialize;

/// Candidates below this cosine similarity are never returned
const MIN_SIMILARITY: f64 = 0.3;

/// One context line returned from a query
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Neighbor {
    pub similarity: f64,
    pub line: String,
}

#[derive(Debug)]
struct BufferedLine {
    line: String,
    tf: AHashMap<String, f64>,
    norm: f64,
}

/// Ring of recently observed lines
#[derive(Debug)]
pub struct NeighborBuffer {
    entries: VecDeque<BufferedLine>,
    capacity: usize,
}

impl NeighborBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember a line; the oldest entry falls out beyond capacity
    pub fn push(&mut self, line: &str, tokens: &[String]) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let (tf, norm) = term_frequencies(tokens);
        self.entries.push_back(BufferedLine {
            line: line.to_string(),
            tf,
            norm,
        });
    }

    /// Top-k entries by cosine similarity, most recent first on ties
    pub fn query(&self, tokens: &[String], k: usize) -> Vec<Neighbor> {
        self.query_skipping_newest(tokens, k, 0)
    }

    /// Like [`query`](Self::query) but ignoring the `skip` newest entries,
    /// so a line just pushed does not match itself
    pub fn query_skipping_newest(&self, tokens: &[String], k: usize, skip: usize) -> Vec<Neighbor> {
        if k == 0 || tokens.is_empty() {
            return Vec::new();
        }
        let (query_tf, query_norm) = term_frequencies(tokens);
        if query_norm == 0.0 {
            return Vec::new();
        }
        // age 0 = newest surviving entry
        let mut scored: Vec<(f64, usize, &BufferedLine)> = self
            .entries
            .iter()
            .rev()
            .skip(skip)
            .enumerate()
            .filter_map(|(age, entry)| {
                let similarity = cosine(&query_tf, query_norm, entry);
                (similarity >= MIN_SIMILARITY).then_some((similarity, age, entry))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored
            .into_iter()
            .take(k)
            .map(|(similarity, _, entry)| Neighbor {
                similarity,
                line: entry.line.clone(),
            })
            .collect()
    }
}

fn term_frequencies(tokens: &[String]) -> (AHashMap<String, f64>, f64) {
    let mut tf: AHashMap<String, f64> = AHashMap::with_capacity(tokens.len());
    for token in tokens {
        *tf.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    let norm = tf.values().map(|v| v * v).sum::<f64>().sqrt();
    (tf, norm)
}

fn cosine(query_tf: &AHashMap<String, f64>, query_norm: f64, entry: &BufferedLine) -> f64 {
    if entry.norm == 0.0 {
        return 0.0;
    }
    // Iterate the smaller vector
    let (small, large) = if query_tf.len() <= entry.tf.len() {
        (query_tf, &entry.tf)
    } else {
        (&entry.tf, query_tf)
    };
    let dot: f64 = small
        .iter()
        .filter_map(|(token, weight)| large.get(token).map(|other| weight * other))
        .sum();
    dot / (query_norm * entry.norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_identical_line_scores_one() {
        let mut buffer = NeighborBuffer::new(8);
        buffer.push("db timeout on replica", &toks(&["db", "timeout", "on", "replica"]));
        let found = buffer.query(&toks(&["db", "timeout", "on", "replica"]), 3);
        assert_eq!(found.len(), 1);
        assert!((found[0].similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dissimilar_lines_filtered() {
        let mut buffer = NeighborBuffer::new(8);
        buffer.push("alpha beta gamma", &toks(&["alpha", "beta", "gamma"]));
        let found = buffer.query(&toks(&["totally", "different", "words"]), 3);
        assert!(found.is_empty());
    }

    #[test]
    fn test_topk_ordering_by_similarity() {
        let mut buffer = NeighborBuffer::new(8);
        buffer.push("db timeout replica two", &toks(&["db", "timeout", "replica", "two"]));
        buffer.push("db timeout", &toks(&["db", "timeout"]));
        buffer.push("unrelated noise", &toks(&["unrelated", "noise"]));
        let found = buffer.query(&toks(&["db", "timeout"]), 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line, "db timeout");
        assert!(found[0].similarity > found[1].similarity);
    }

    #[test]
    fn test_recency_breaks_ties() {
        let mut buffer = NeighborBuffer::new(8);
        buffer.push("cache miss first", &toks(&["cache", "miss", "first"]));
        buffer.push("cache miss second", &toks(&["cache", "miss", "second"]));
        let found = buffer.query(&toks(&["cache", "miss", "third"]), 2);
        assert_eq!(found.len(), 2);
        // Equal similarity; the later entry wins
        assert_eq!(found[0].line, "cache miss second");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = NeighborBuffer::new(2);
        buffer.push("one one", &toks(&["one", "one"]));
        buffer.push("two two", &toks(&["two", "two"]));
        buffer.push("three three", &toks(&["three", "three"]));
        assert_eq!(buffer.len(), 2);
        assert!(buffer.query(&toks(&["one"]), 3).is_empty());
        assert_eq!(buffer.query(&toks(&["three"]), 3).len(), 1);
    }

    #[test]
    fn test_skip_newest_excludes_self() {
        let mut buffer = NeighborBuffer::new(8);
        buffer.push("earlier failure", &toks(&["earlier", "failure"]));
        buffer.push("current failure", &toks(&["current", "failure"]));
        let found = buffer.query_skipping_newest(&toks(&["current", "failure"]), 3, 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, "earlier failure");
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let mut buffer = NeighborBuffer::new(4);
        buffer.push("something", &toks(&["something"]));
        assert!(buffer.query(&[], 3).is_empty());
    }
}
