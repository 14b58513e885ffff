//! Dispersion estimation for negative binomial models
//!
//! Three stages: gene-wise maximum likelihood, a parametric trend across
//! genes, then shrinkage of each gene toward the trend. The trend fit is the
//! only step that needs every gene; the other two run per gene in parallel.

mod gene_wise;
mod likelihood;
mod map;
mod trend;

pub use gene_wise::{estimate_gene_wise, linear_model_mu, moments_dispersion, GeneWiseEstimate};
pub use map::{estimate_prior_variance, fit_map_dispersion, is_dispersion_outlier};
pub use trend::{fit_dispersion_trend, fit_mean_trend, DispersionTrend, TrendKind};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::ValidatedDataset;
use crate::error::Result;
use crate::glm::ModelDesign;
use crate::normalization::{base_means, SizeFactors};

/// Configurable parameters for dispersion estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionParams {
    /// Lower bound for every dispersion estimate
    pub min_disp: f64,
    /// Upper bound; `max(n_samples, 10)` when unset
    pub max_disp: Option<f64>,
    /// Convergence tolerance on the change in log dispersion
    pub disp_tol: f64,
    /// Maximum Newton iterations per gene
    pub maxit: usize,
    /// Genes this many SDs above the trend (log scale) keep their gene-wise value
    pub outlier_sd: f64,
    /// Floor for the prior variance of log dispersions
    pub min_prior_var: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            max_disp: None,
            disp_tol: 1e-6,
            maxit: 100,
            outlier_sd: 2.0,
            min_prior_var: 0.25,
        }
    }
}

impl DispersionParams {
    pub fn max_disp_for(&self, n_samples: usize) -> f64 {
        self.max_disp.unwrap_or_else(|| (n_samples as f64).max(10.0))
    }
}

/// Dispersion estimates for one gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneDispersion {
    pub gene_wise: Option<f64>,
    pub gene_wise_converged: bool,
    /// Trend value at the gene's base mean
    pub trended: f64,
    /// Dispersion used for testing; `None` drops the gene from results
    pub final_dispersion: Option<f64>,
    pub outlier: bool,
    pub map_converged: bool,
}

/// Output of the dispersion stage, in dataset gene order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionEstimates {
    pub genes: Vec<GeneDispersion>,
    pub trend: DispersionTrend,
    pub prior_var: f64,
    pub var_log_disp_ests: f64,
}

impl DispersionEstimates {
    pub fn n_outliers(&self) -> usize {
        self.genes.iter().filter(|g| g.outlier).count()
    }

    pub fn n_unconverged(&self) -> usize {
        self.genes
            .iter()
            .filter(|g| g.gene_wise.is_some() && !g.gene_wise_converged)
            .count()
    }
}

/// Estimate gene-wise, trended and final dispersions for every gene.
pub fn estimate_dispersions(
    dataset: &ValidatedDataset,
    size_factors: &SizeFactors,
    params: &DispersionParams,
) -> Result<DispersionEstimates> {
    let design = ModelDesign::from_dataset(dataset);
    let counts = dataset.counts().counts();
    let gene_ids = dataset.counts().gene_ids();
    let sf = size_factors.as_slice();
    let n_samples = dataset.n_samples();
    let max_disp = params.max_disp_for(n_samples);
    let xim = sf.iter().map(|s| 1.0 / s).sum::<f64>() / n_samples as f64;
    let means = base_means(dataset.counts(), size_factors);

    // Stage 1: gene-wise MLE
    let gene_wise: Vec<GeneWiseEstimate> = (0..dataset.n_genes())
        .into_par_iter()
        .map(|i| {
            let row = counts.row(i).to_vec();
            estimate_gene_wise(&row, sf, &design.matrix, xim, max_disp, params)
        })
        .collect();

    let gw_values: Vec<Option<f64>> = gene_wise.iter().map(|g| g.dispersion).collect();
    for (i, est) in gene_wise.iter().enumerate() {
        if est.dispersion.is_some() && !est.converged {
            log::warn!(
                "Gene-wise dispersion for {} did not converge in {} iterations",
                gene_ids[i],
                est.iterations
            );
        }
    }
    log::info!(
        "Gene-wise dispersions: {} estimated, {} without estimate",
        gw_values.iter().filter(|d| d.is_some()).count(),
        gw_values.iter().filter(|d| d.is_none()).count()
    );

    // Stage 2: trend across genes
    let trend = fit_dispersion_trend(&means, &gw_values, params.min_disp)?;
    let trended: Vec<f64> = means.iter().map(|&m| trend.eval(m)).collect();

    // Stage 3: shrinkage
    let (prior_var, var_log_disp_ests) =
        estimate_prior_variance(&gw_values, &trended, n_samples, design.n_coefs(), params);

    let genes: Vec<GeneDispersion> = (0..dataset.n_genes())
        .into_par_iter()
        .map(|i| {
            let est = &gene_wise[i];
            let trend_value = trended[i];
            let Some(gw) = est.dispersion else {
                return GeneDispersion {
                    gene_wise: None,
                    gene_wise_converged: false,
                    trended: trend_value,
                    final_dispersion: None,
                    outlier: false,
                    map_converged: false,
                };
            };

            let row = counts.row(i).to_vec();
            let (map, map_converged) =
                fit_map_dispersion(&row, &design.matrix, &est.mu, gw, trend_value, prior_var, max_disp, params);
            let outlier = is_dispersion_outlier(gw, trend_value, var_log_disp_ests, params.outlier_sd);

            GeneDispersion {
                gene_wise: Some(gw),
                gene_wise_converged: est.converged,
                trended: trend_value,
                final_dispersion: Some(if outlier { gw } else { map }),
                outlier,
                map_converged,
            }
        })
        .collect();

    let estimates = DispersionEstimates {
        genes,
        trend,
        prior_var,
        var_log_disp_ests,
    };
    log::info!(
        "Final dispersions: prior variance {:.4}, {} outliers kept at gene-wise value, {} gene-wise fits unconverged",
        prior_var,
        estimates.n_outliers(),
        estimates.n_unconverged()
    );
    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata, ValidationParams};
    use crate::normalization::{estimate_size_factors, SizeFactorParams};
    use ndarray::Array2;

    fn dataset() -> ValidatedDataset {
        // 30 genes with moderate noise around level means plus one all-zero gene
        let n_genes = 31;
        let noise = [0.92, 1.07, 1.01, 0.95, 1.04, 1.0];
        let counts = Array2::from_shape_fn((n_genes, 6), |(i, j)| {
            if i == n_genes - 1 {
                return 0.0;
            }
            let base = 20.0 * 1.2f64.powi(i as i32);
            let shift = if j >= 3 && i % 5 == 0 { 3.0 } else { 1.0 };
            let rot = noise[(j + i) % 6];
            (base * shift * rot).round()
        });
        let genes: Vec<String> = (0..n_genes).map(|i| format!("gene{}", i)).collect();
        let samples: Vec<String> = (1..=6).map(|j| format!("s{}", j)).collect();
        let matrix = CountMatrix::new(counts, genes, samples.clone()).unwrap();

        let mut meta = SampleMetadata::new(samples);
        meta.add_factor(
            "condition",
            vec!["a".into(), "a".into(), "a".into(), "b".into(), "b".into(), "b".into()],
        )
        .unwrap();
        let params = ValidationParams {
            min_total_count: 0.0,
            ..Default::default()
        };
        ValidatedDataset::new(&matrix, &meta, "condition", &params).unwrap()
    }

    #[test]
    fn test_estimate_dispersions_stages() {
        let ds = dataset();
        let sf = estimate_size_factors(ds.counts(), &SizeFactorParams::default()).unwrap();
        let params = DispersionParams::default();
        let disp = estimate_dispersions(&ds, &sf, &params).unwrap();

        assert_eq!(disp.genes.len(), 31);
        assert!(disp.prior_var >= 0.25);

        // All-zero gene carries no estimate and is dropped
        let zero = &disp.genes[30];
        assert!(zero.gene_wise.is_none());
        assert!(zero.final_dispersion.is_none());

        for g in &disp.genes[..30] {
            let d = g.final_dispersion.unwrap();
            assert!(d >= params.min_disp && d <= 10.0);
            if g.outlier {
                assert_eq!(g.final_dispersion, g.gene_wise);
            }
        }
    }

    #[test]
    fn test_max_disp_default() {
        let params = DispersionParams::default();
        assert_eq!(params.max_disp_for(6), 10.0);
        assert_eq!(params.max_disp_for(25), 25.0);
    }
}
