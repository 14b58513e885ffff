//! Benjamini-Hochberg false discovery rate adjustment

use std::cmp::Ordering;

/// Benjamini-Hochberg adjusted p-values.
///
/// NaN entries are not tests: they stay NaN and do not count toward `m`.
/// Each adjusted value is the running minimum of `p * m / rank` taken from
/// the largest p-value down, capped at 1.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let mut indices: Vec<usize> = (0..n).filter(|&i| !pvalues[i].is_nan()).collect();
    let m = indices.len();
    let mut padj = vec![f64::NAN; n];
    if m == 0 {
        return padj;
    }

    indices.sort_by(|&a, &b| pvalues[a].partial_cmp(&pvalues[b]).unwrap_or(Ordering::Equal));

    let mut cummin = f64::INFINITY;
    for (rank, &i) in indices.iter().enumerate().rev() {
        let adj = (pvalues[i] * m as f64 / (rank + 1) as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
    }
    padj
}
