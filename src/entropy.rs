//! Multi-order sequence entropy
//!
//! Reduces an ordered sequence of behavioral labels to a single complexity score:
//!
//! ```text
//! H = H1 + H2 + H3
//! ```
//!
//! - `H1` is the Shannon entropy of the marginal label distribution.
//! - `H2` sums, over every one-label context `prev`, the entropy of `p(curr | prev)`.
//! - `H3` does the same over two-label contexts `(prev2, prev1)`.
//!
//! The order-2 and order-3 terms are *unweighted* sums of per-context conditional
//! entropies. Textbook conditional entropy would weight each context by its marginal
//! probability (`Σ p(ctx) · H(curr | ctx)`); the unweighted form is kept so scores stay
//! comparable with previously recorded trials. A sequence with many distinct branching
//! contexts therefore scores higher than its weighted counterpart would.
//!
//! All logarithms are base 2. Contexts are summed in order of their first occurrence
//! in the sequence, so a given input always yields the same bits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Per-order entropy terms for one sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyBreakdown {
    /// Number of labels in the sequence
    pub event_count: usize,
    /// Number of distinct labels
    pub distinct_labels: usize,
    /// Marginal (order-1) entropy
    pub h1: f64,
    /// Sum of first-order conditional entropies
    pub h2: f64,
    /// Sum of second-order conditional entropies
    pub h3: f64,
    /// `h1 + h2 + h3`
    pub total: f64,
}

impl EntropyBreakdown {
    fn empty() -> Self {
        Self {
            event_count: 0,
            distinct_labels: 0,
            h1: 0.0,
            h2: 0.0,
            h3: 0.0,
            total: 0.0,
        }
    }
}

/// Sequence entropy engine
pub struct EntropyEngine;

impl EntropyEngine {
    /// Compute the entropy score of a label sequence
    pub fn compute<T: Eq + Hash>(labels: &[T]) -> f64 {
        Self::breakdown(labels).total
    }

    /// Compute the score together with its per-order terms
    pub fn breakdown<T: Eq + Hash>(labels: &[T]) -> EntropyBreakdown {
        let n = labels.len();
        if n == 0 {
            return EntropyBreakdown::empty();
        }

        let symbols = intern(labels);
        let distinct_labels = symbols.iter().copied().max().map_or(0, |m| m + 1);

        let mut marginal = vec![0u64; distinct_labels];
        for &s in &symbols {
            marginal[s] += 1;
        }
        let h1 = shannon(&marginal, n as u64);

        let mut pairs: ContextTable<usize> = ContextTable::default();
        for w in symbols.windows(2) {
            pairs.observe(w[0], w[1]);
        }
        let h2 = pairs.summed_conditional_entropy();

        let mut triples: ContextTable<(usize, usize)> = ContextTable::default();
        for w in symbols.windows(3) {
            triples.observe((w[0], w[1]), w[2]);
        }
        let h3 = triples.summed_conditional_entropy();

        EntropyBreakdown {
            event_count: n,
            distinct_labels,
            h1,
            h2,
            h3,
            total: h1 + h2 + h3,
        }
    }
}

/// Map labels to dense symbol ids in first-occurrence order
fn intern<T: Eq + Hash>(labels: &[T]) -> Vec<usize> {
    let mut ids: HashMap<&T, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            let next = ids.len();
            *ids.entry(label).or_insert(next)
        })
        .collect()
}

/// Shannon entropy (bits) of a frequency table, skipping empty cells
fn shannon(counts: &[u64], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let mut h = 0.0;
    for &c in counts {
        if c == 0 {
            continue;
        }
        let p = c as f64 / total;
        h -= p * p.log2();
    }
    h
}

/// Successor counts observed after one context
#[derive(Default)]
struct ContextRow {
    slots: HashMap<usize, usize>,
    counts: Vec<u64>,
    total: u64,
}

impl ContextRow {
    fn observe(&mut self, next: usize) {
        let slot = match self.slots.get(&next) {
            Some(&slot) => slot,
            None => {
                self.counts.push(0);
                let slot = self.counts.len() - 1;
                self.slots.insert(next, slot);
                slot
            }
        };
        self.counts[slot] += 1;
        self.total += 1;
    }
}

/// Context → successor frequency table, rows kept in first-occurrence order
struct ContextTable<K> {
    index: HashMap<K, usize>,
    rows: Vec<ContextRow>,
}

impl<K> Default for ContextTable<K> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
        }
    }
}

impl<K: Eq + Hash> ContextTable<K> {
    fn observe(&mut self, context: K, next: usize) {
        let rows = &mut self.rows;
        let row = *self.index.entry(context).or_insert_with(|| {
            rows.push(ContextRow::default());
            rows.len() - 1
        });
        self.rows[row].observe(next);
    }

    fn summed_conditional_entropy(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| shannon(&row.counts, row.total))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_empty_sequence() {
        let empty: [&str; 0] = [];
        assert_eq!(EntropyEngine::compute(&empty), 0.0);
        assert_eq!(EntropyEngine::breakdown(&empty).event_count, 0);
    }

    #[test]
    fn test_single_label() {
        assert_eq!(EntropyEngine::compute(&["grooming"]), 0.0);
    }

    #[test]
    fn test_repeated_label_is_zero() {
        for n in 1..12 {
            let labels = vec!["freezing"; n];
            assert_eq!(EntropyEngine::compute(&labels), 0.0, "n = {}", n);
        }
    }

    #[test]
    fn test_alternating_sequence() {
        let b = EntropyEngine::breakdown(&["G", "C", "G", "C", "G"]);

        let expected_h1 = -(0.6 * 0.6f64.log2() + 0.4 * 0.4f64.log2());
        assert!((b.h1 - expected_h1).abs() < EPS);
        assert_eq!(b.h2, 0.0);
        assert_eq!(b.h3, 0.0);
        assert!((b.total - 0.9710).abs() < 1e-4);
        assert_eq!(b.distinct_labels, 2);
    }

    #[test]
    fn test_conditional_terms_are_unweighted() {
        // a -> {b, c} is the only branching context: one full bit, not 2/3 of a bit
        let b = EntropyEngine::breakdown(&["a", "b", "a", "c"]);
        assert!((b.h1 - 1.5).abs() < EPS);
        assert!((b.h2 - 1.0).abs() < EPS);
        assert_eq!(b.h3, 0.0);
        assert!((b.total - 2.5).abs() < EPS);
    }

    #[test]
    fn test_third_order_term() {
        // (a, a) -> {b, c}; a -> {a, a, b, c}
        let b = EntropyEngine::breakdown(&["a", "a", "b", "a", "a", "c"]);
        assert!((b.h2 - 1.5).abs() < EPS);
        assert!((b.h3 - 1.0).abs() < EPS);

        let expected_h1 = -((4.0 / 6.0) * (4.0f64 / 6.0).log2()
            + 2.0 * (1.0 / 6.0) * (1.0f64 / 6.0).log2());
        assert!((b.h1 - expected_h1).abs() < EPS);
        assert!((b.total - (expected_h1 + 2.5)).abs() < EPS);
    }

    #[test]
    fn test_two_labels_only_marginal() {
        let b = EntropyEngine::breakdown(&["sniffing", "grooming"]);
        assert!((b.h1 - 1.0).abs() < EPS);
        assert_eq!(b.h2, 0.0);
        assert_eq!(b.h3, 0.0);
    }

    #[test]
    fn test_relabeling_invariance() {
        let original = ["x", "y", "x", "z", "y", "y", "x", "z", "z", "x"];
        let renamed: Vec<&str> = original
            .iter()
            .map(|l| match *l {
                "x" => "rearing",
                "y" => "grooming",
                _ => "sniffing",
            })
            .collect();

        assert_eq!(
            EntropyEngine::compute(&original),
            EntropyEngine::compute(&renamed)
        );
    }

    #[test]
    fn test_generic_over_label_type() {
        #[derive(PartialEq, Eq, Hash)]
        enum Act {
            Rear,
            Groom,
        }

        let acts = [Act::Rear, Act::Groom, Act::Rear, Act::Groom];
        let strs = ["r", "g", "r", "g"];
        assert_eq!(EntropyEngine::compute(&acts), EntropyEngine::compute(&strs));
    }

    #[test]
    fn test_compute_is_idempotent() {
        let labels = [
            "rear", "groom", "sniff", "rear", "rear", "freeze", "groom", "sniff", "sniff",
        ];
        let first = EntropyEngine::compute(&labels);
        let second = EntropyEngine::compute(&labels);
        assert_eq!(first.to_bits(), second.to_bits());
        assert!(first > 0.0);
    }

    #[test]
    fn test_total_is_sum_of_terms() {
        let labels = ["a", "b", "c", "a", "c", "b", "a", "a", "b", "c", "c"];
        let b = EntropyEngine::breakdown(&labels);
        assert!(b.h1 >= 0.0 && b.h2 >= 0.0 && b.h3 >= 0.0);
        assert_eq!(b.total, b.h1 + b.h2 + b.h3);
        assert_eq!(EntropyEngine::compute(&labels), b.total);
    }
}
