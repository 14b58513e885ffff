//! Gene-wise maximum likelihood dispersion estimates

use ndarray::Array2;

use super::likelihood::{maximize_log_dispersion, DispersionObjective};
use super::DispersionParams;
use crate::glm::linalg::{solve_symmetric, weighted_crossprod, weighted_crossprod_vec};
use crate::glm::MIN_MU;

/// Gene-wise estimate with the expected counts it was computed against
#[derive(Debug, Clone, PartialEq)]
pub struct GeneWiseEstimate {
    /// `None` when the gene has no usable estimate (all-zero or non-finite)
    pub dispersion: Option<f64>,
    pub converged: bool,
    pub iterations: usize,
    /// Expected counts per sample
    pub mu: Vec<f64>,
}

/// Expected counts from a least-squares fit of normalized counts on the design.
///
/// For a single-factor design this is each level's mean normalized count,
/// scaled back by the sample's size factor.
pub fn linear_model_mu(counts: &[f64], size_factors: &[f64], design: &Array2<f64>) -> Option<Vec<f64>> {
    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).collect();
    let ones = vec![1.0; counts.len()];
    let beta = solve_symmetric(
        &weighted_crossprod(design, &ones),
        &weighted_crossprod_vec(design, &ones, &normalized),
    )?;

    Some(
        design
            .outer_iter()
            .zip(size_factors)
            .map(|(row, &s)| {
                let fitted: f64 = row.iter().zip(beta.iter()).map(|(x, b)| x * b).sum();
                (fitted * s).max(MIN_MU)
            })
            .collect(),
    )
}

/// Method-of-moments dispersion: (variance - xim * mean) / mean^2,
/// where xim is the mean of the inverse size factors.
pub fn moments_dispersion(normalized: &[f64], xim: f64) -> f64 {
    let n = normalized.len() as f64;
    let mean = normalized.iter().sum::<f64>() / n;
    let var = if n > 1.0 {
        normalized.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };

    if mean > 1e-10 {
        (var - xim * mean) / (mean * mean)
    } else {
        f64::INFINITY
    }
}

/// Maximize the Cox-Reid adjusted likelihood for one gene.
pub fn estimate_gene_wise(
    counts: &[f64],
    size_factors: &[f64],
    design: &Array2<f64>,
    xim: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> GeneWiseEstimate {
    let unusable = |mu: Vec<f64>| GeneWiseEstimate {
        dispersion: None,
        converged: false,
        iterations: 0,
        mu,
    };

    if counts.iter().all(|&c| c == 0.0) {
        return unusable(vec![0.0; counts.len()]);
    }

    let Some(mu) = linear_model_mu(counts, size_factors, design) else {
        return unusable(vec![f64::NAN; counts.len()]);
    };

    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).collect();
    let start = moments_dispersion(&normalized, xim);
    let start = if start.is_nan() { params.min_disp } else { start.clamp(params.min_disp, max_disp) };

    let objective = DispersionObjective {
        counts,
        mu: &mu,
        design,
        prior: None,
    };
    let outcome = maximize_log_dispersion(
        &objective,
        start.ln(),
        params.min_disp.ln(),
        max_disp.ln(),
        params.disp_tol,
        params.maxit,
    );

    let alpha = outcome.log_alpha.exp();
    GeneWiseEstimate {
        dispersion: alpha.is_finite().then_some(alpha),
        converged: outcome.converged,
        iterations: outcome.iterations,
        mu,
    }
}
