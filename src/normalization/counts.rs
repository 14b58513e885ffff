//! Normalized counts and base means

use ndarray::{Array2, Axis};

use super::SizeFactors;
use crate::data::CountMatrix;

/// Counts divided by their sample's size factor
pub fn normalized_counts(counts: &CountMatrix, size_factors: &SizeFactors) -> Array2<f64> {
    let mut normalized = counts.counts().to_owned();
    for (mut column, &sf) in normalized.axis_iter_mut(Axis(1)).zip(size_factors.values().iter()) {
        column.mapv_inplace(|x| x / sf);
    }
    normalized
}

/// Mean normalized count per gene
pub fn base_means(counts: &CountMatrix, size_factors: &SizeFactors) -> Vec<f64> {
    normalized_counts(counts, size_factors)
        .axis_iter(Axis(0))
        .map(|row| row.mean().unwrap_or(0.0))
        .collect()
}
