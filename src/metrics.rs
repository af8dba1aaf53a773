//! Agreement between a hard clustering and reference labels.
//!
//! Cluster indices are arbitrary: a fit that swaps components 0 and 1 is just
//! as good. Both measures here are invariant to label permutation.
//!
//! | Metric | Range | Best |
//! |--------|-------|------|
//! | [`purity`] | [0, 1] | 1 |
//! | [`ari`] | [-1, 1] | 1 |
//!
//! # Example
//!
//! ```rust
//! use mixfit::metrics::{ari, purity};
//!
//! let pred = [1, 1, 0, 0];
//! let truth = [0, 0, 1, 1];
//! assert_eq!(purity(&pred, &truth), 1.0);
//! assert!((ari(&pred, &truth) - 1.0).abs() < 1e-12);
//! ```
//!
//! # References
//!
//! - Hubert & Arabie (1985). "Comparing partitions" (ARI)

use std::collections::HashMap;

/// Counts of (predicted, true) label pairs.
fn contingency(pred: &[usize], truth: &[usize]) -> HashMap<(usize, usize), usize> {
    let mut joint = HashMap::new();
    for (&p, &t) in pred.iter().zip(truth.iter()) {
        *joint.entry((p, t)).or_insert(0usize) += 1;
    }
    joint
}

fn comb2(n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        (n * (n - 1) / 2) as f64
    }
}

/// Fraction of points whose cluster's majority label matches their own.
///
/// Returns 0.0 for empty or mismatched inputs.
pub fn purity(pred: &[usize], truth: &[usize]) -> f64 {
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }

    let mut majority: HashMap<usize, usize> = HashMap::new();
    for (&(p, _), &count) in &contingency(pred, truth) {
        let best = majority.entry(p).or_insert(0);
        *best = (*best).max(count);
    }

    majority.values().sum::<usize>() as f64 / pred.len() as f64
}

/// Adjusted Rand index.
///
/// 1.0 for identical partitions, around 0.0 for chance agreement.
/// Returns 0.0 for empty or mismatched inputs.
pub fn ari(pred: &[usize], truth: &[usize]) -> f64 {
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }

    let joint = contingency(pred, truth);
    let mut row_sums: HashMap<usize, usize> = HashMap::new();
    let mut col_sums: HashMap<usize, usize> = HashMap::new();
    for (&(p, t), &count) in &joint {
        *row_sums.entry(p).or_insert(0) += count;
        *col_sums.entry(t).or_insert(0) += count;
    }

    let index: f64 = joint.values().map(|&c| comb2(c)).sum();
    let sum_a: f64 = row_sums.values().map(|&a| comb2(a)).sum();
    let sum_b: f64 = col_sums.values().map(|&b| comb2(b)).sum();
    let total = comb2(pred.len());
    if total == 0.0 {
        return 1.0;
    }

    let expected = sum_a * sum_b / total;
    let max_index = (sum_a + sum_b) / 2.0;
    let denom = max_index - expected;
    if denom.abs() < 1e-10 {
        return 1.0;
    }

    (index - expected) / denom
}
