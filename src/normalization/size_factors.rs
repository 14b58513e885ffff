//! Size factor estimation using the median of ratios method

use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::error::{DiffExprError, Result};
use crate::stats::median;

/// Parameters for size factor estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeFactorParams {
    /// Minimum number of genes with non-zero counts in every sample
    pub min_genes: usize,
}

impl Default for SizeFactorParams {
    fn default() -> Self {
        Self { min_genes: 1 }
    }
}

/// Per-sample normalization scalars, in count-column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeFactors {
    sample_ids: Vec<String>,
    values: Array1<f64>,
}

impl SizeFactors {
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values.as_slice().unwrap_or(&[])
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Size factor of one sample
    pub fn get(&self, sample_id: &str) -> Option<f64> {
        self.sample_ids
            .iter()
            .position(|id| id == sample_id)
            .map(|j| self.values[j])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Estimate size factors using the median of ratios method.
///
/// Each gene's geometric mean across samples is the pseudo-reference; genes
/// with a zero in any sample have a zero geometric mean and are skipped. A
/// sample's size factor is the median of its count/reference ratios.
pub fn estimate_size_factors(counts: &CountMatrix, params: &SizeFactorParams) -> Result<SizeFactors> {
    let view = counts.counts();
    let (n_genes, n_samples) = view.dim();

    if n_genes == 0 || n_samples == 0 {
        return Err(DiffExprError::DegenerateInput {
            reason: "count matrix is empty".to_string(),
        });
    }

    let mut geo_means = Vec::with_capacity(n_genes);
    let mut usable_genes = Vec::new();

    for (i, row) in view.axis_iter(Axis(0)).enumerate() {
        if row.iter().all(|&x| x > 0.0) {
            let log_sum: f64 = row.iter().map(|&x| x.ln()).sum();
            geo_means.push((log_sum / n_samples as f64).exp());
            usable_genes.push(i);
        }
    }

    if usable_genes.len() < params.min_genes.max(1) {
        return Err(DiffExprError::DegenerateInput {
            reason: format!(
                "{} genes have non-zero counts in every sample, at least {} required for size factors",
                usable_genes.len(),
                params.min_genes.max(1)
            ),
        });
    }

    let mut values = Array1::zeros(n_samples);
    for j in 0..n_samples {
        let mut ratios: Vec<f64> = usable_genes
            .iter()
            .zip(geo_means.iter())
            .map(|(&i, &geo_mean)| view[[i, j]] / geo_mean)
            .collect();
        values[j] = median(&mut ratios);
    }

    if values.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(DiffExprError::DegenerateInput {
            reason: format!("invalid size factors computed: {:?}", values.to_vec()),
        });
    }

    log::info!(
        "Estimated size factors from {} of {} genes: {:?}",
        usable_genes.len(),
        n_genes,
        values.to_vec()
    );

    Ok(SizeFactors {
        sample_ids: counts.sample_ids().to_vec(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_uniform_scaling_recovered() {
        // Every sample is the same profile scaled by 1, 2, 4, 8
        let profile = [10.0, 20.0, 30.0, 50.0, 7.0];
        let scales = [1.0, 2.0, 4.0, 8.0];
        let counts = ndarray::Array2::from_shape_fn((5, 4), |(i, j)| profile[i] * scales[j]);
        let matrix = CountMatrix::new(counts, ids("gene", 5), ids("s", 4)).unwrap();

        let sf = estimate_size_factors(&matrix, &SizeFactorParams::default()).unwrap();

        // Normalized to geometric mean 1: 64^(1/4)
        let geo = 64f64.powf(0.25);
        for (j, &s) in scales.iter().enumerate() {
            assert!((sf.values()[j] - s / geo).abs() < 1e-10);
        }
        assert!((sf.get("s2").unwrap() - 2.0 / geo).abs() < 1e-10);
    }

    #[test]
    fn test_genes_with_zero_skipped() {
        let counts = array![
            [100.0, 200.0, 80.0, 160.0],
            [0.0, 1000.0, 400.0, 800.0],
            [50.0, 100.0, 40.0, 80.0],
        ];
        let matrix = CountMatrix::new(counts, ids("gene", 3), ids("s", 4)).unwrap();
        let sf = estimate_size_factors(&matrix, &SizeFactorParams::default()).unwrap();

        assert!(sf.values().iter().all(|&x| x > 0.0));
        assert!((sf.values()[1] / sf.values()[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_no_usable_gene_is_degenerate() {
        let counts = array![[0.0, 10.0], [10.0, 0.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).unwrap();
        let err = estimate_size_factors(&matrix, &SizeFactorParams::default());
        assert!(matches!(err, Err(DiffExprError::DegenerateInput { .. })));
    }

    #[test]
    fn test_min_genes_enforced() {
        let counts = array![[10.0, 20.0], [0.0, 5.0], [3.0, 6.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 3), ids("s", 2)).unwrap();
        let params = SizeFactorParams { min_genes: 3 };
        let err = estimate_size_factors(&matrix, &params);
        assert!(matches!(err, Err(DiffExprError::DegenerateInput { .. })));
    }
}
