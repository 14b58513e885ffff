//! GLM fitting using Iteratively Reweighted Least Squares (IRLS)

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::design::ModelDesign;
use super::linalg::{invert_symmetric, solve_symmetric, weighted_crossprod, weighted_crossprod_vec};
use super::negative_binomial::{nb_deviance, nb_mean, nb_weight, MAX_BETA, MIN_MU};
use crate::data::ValidatedDataset;
use crate::dispersion::DispersionEstimates;
use crate::error::Result;
use crate::normalization::SizeFactors;

/// Configurable parameters for GLM fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Convergence tolerance on the relative deviance change
    pub beta_tol: f64,
    /// Ridge penalty added to the diagonal of X'WX
    pub ridge: f64,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        let ln2 = std::f64::consts::LN_2;
        Self {
            maxit: 100,
            beta_tol: 1e-8,
            ridge: 1e-6 / (ln2 * ln2),
        }
    }
}

/// Converged fit for one gene. Coefficients are on the natural-log scale.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneFit {
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    /// Coefficient covariance (n_coefs x n_coefs)
    pub covariance: Array2<f64>,
    pub deviance: f64,
    pub iterations: usize,
}

/// Outcome of fitting one gene
#[derive(Debug, Clone, PartialEq)]
pub enum GeneGlm {
    Fitted(GeneFit),
    /// IRLS diverged, produced non-finite values or ran out of iterations
    FitFailure { reason: String },
    /// No final dispersion, so the gene was never fitted
    NoDispersion,
}

impl GeneGlm {
    pub fn fit(&self) -> Option<&GeneFit> {
        match self {
            GeneGlm::Fitted(fit) => Some(fit),
            _ => None,
        }
    }
}

/// Per-gene fits for the whole dataset, in dataset gene order
#[derive(Debug, Clone)]
pub struct GlmFits {
    pub design: ModelDesign,
    pub genes: Vec<GeneGlm>,
}

impl GlmFits {
    pub fn n_fitted(&self) -> usize {
        self.genes.iter().filter(|g| g.fit().is_some()).count()
    }

    pub fn n_failed(&self) -> usize {
        self.genes
            .iter()
            .filter(|g| matches!(g, GeneGlm::FitFailure { .. }))
            .count()
    }
}

/// Fit the negative binomial GLM to every gene with a final dispersion.
pub fn fit_glm(
    dataset: &ValidatedDataset,
    size_factors: &SizeFactors,
    dispersions: &DispersionEstimates,
    params: &GlmFitParams,
) -> Result<GlmFits> {
    let design = ModelDesign::from_dataset(dataset);
    let counts = dataset.counts().counts();
    let gene_ids = dataset.counts().gene_ids();
    let sf = size_factors.values();

    let genes: Vec<GeneGlm> = (0..dataset.n_genes())
        .into_par_iter()
        .map(|i| match dispersions.genes[i].final_dispersion {
            Some(alpha) => match fit_single_gene(counts.row(i), &design.matrix, sf.view(), alpha, params) {
                Ok(fit) => GeneGlm::Fitted(fit),
                Err(reason) => {
                    log::warn!("GLM fit failed for gene {}: {}", gene_ids[i], reason);
                    GeneGlm::FitFailure { reason }
                }
            },
            None => GeneGlm::NoDispersion,
        })
        .collect();

    let fits = GlmFits { design, genes };
    log::info!(
        "Fitted GLMs: {} converged, {} failed, {} skipped without dispersion",
        fits.n_fitted(),
        fits.n_failed(),
        dataset.n_genes() - fits.n_fitted() - fits.n_failed()
    );
    Ok(fits)
}

fn linear_predictor(design: &Array2<f64>, beta: &[f64], sample: usize) -> f64 {
    design.row(sample).iter().zip(beta.iter()).map(|(x, b)| x * b).sum()
}

/// Fit one gene by IRLS with fixed dispersion `alpha`.
///
/// The error string describes why the fit was rejected.
pub fn fit_single_gene(
    counts: ArrayView1<f64>,
    design: &Array2<f64>,
    size_factors: ArrayView1<f64>,
    alpha: f64,
    params: &GlmFitParams,
) -> std::result::Result<GeneFit, String> {
    let n_samples = counts.len();
    let n_coefs = design.ncols();
    let y: Vec<f64> = counts.to_vec();

    // Start from least squares on log normalized counts
    let log_norm: Vec<f64> = y
        .iter()
        .zip(size_factors.iter())
        .map(|(&c, &s)| (c / s + 0.1).ln())
        .collect();
    let ones = vec![1.0; n_samples];
    let mut beta = solve_symmetric(&weighted_crossprod(design, &ones), &weighted_crossprod_vec(design, &ones, &log_norm))
        .ok_or_else(|| "design is not of full rank".to_string())?;

    let ridge = Array2::from_diag_elem(n_coefs, params.ridge);
    let mut mus = vec![0.0; n_samples];
    let mut weights = vec![0.0; n_samples];
    let mut working_response = vec![0.0; n_samples];
    let mut dev_old = 0.0f64;
    let mut deviance = f64::NAN;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..params.maxit {
        iterations = iter + 1;
        for i in 0..n_samples {
            let mu = nb_mean(linear_predictor(design, &beta, i), size_factors[i]).max(MIN_MU);
            mus[i] = mu;
            weights[i] = nb_weight(mu, alpha);
            working_response[i] = (mu / size_factors[i]).ln() + (y[i] - mu) / mu;
        }

        let xtwx = weighted_crossprod(design, &weights) + &ridge;
        let xtwz = weighted_crossprod_vec(design, &weights, &working_response);
        beta = solve_symmetric(&xtwx, &xtwz).ok_or_else(|| "X'WX is not positive definite".to_string())?;

        if let Some(b) = beta.iter().find(|b| b.abs() > MAX_BETA || !b.is_finite()) {
            return Err(format!("coefficient diverged to {} at iteration {}", b, iterations));
        }

        for i in 0..n_samples {
            mus[i] = nb_mean(linear_predictor(design, &beta, i), size_factors[i]).max(MIN_MU);
        }
        deviance = nb_deviance(&y, &mus, alpha);

        let conv_test = (deviance - dev_old).abs() / (deviance.abs() + 0.1);
        if !conv_test.is_finite() {
            return Err(format!("non-finite deviance at iteration {}", iterations));
        }
        if iter > 0 && conv_test < params.beta_tol {
            converged = true;
            break;
        }
        dev_old = deviance;
    }

    if !converged {
        return Err(format!("no convergence within {} iterations", params.maxit));
    }

    // Sandwich (X'WX + R)^-1 X'WX (X'WX + R)^-1 at the final estimate
    for i in 0..n_samples {
        weights[i] = nb_weight(mus[i], alpha);
    }
    let xtwx = weighted_crossprod(design, &weights);
    let inv = invert_symmetric(&(&xtwx + &ridge)).ok_or_else(|| "information matrix is singular".to_string())?;
    let covariance = inv.dot(&xtwx).dot(&inv);
    let standard_errors: Vec<f64> = covariance.diag().iter().map(|&v| v.max(0.0).sqrt()).collect();

    if standard_errors.iter().any(|se| !se.is_finite()) {
        return Err("non-finite standard error".to_string());
    }

    Ok(GeneFit {
        coefficients: beta,
        standard_errors,
        covariance,
        deviance,
        iterations,
    })
}
