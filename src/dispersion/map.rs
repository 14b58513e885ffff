//! Maximum a posteriori dispersion shrinkage toward the trend

use ndarray::Array2;

use super::likelihood::{maximize_log_dispersion, DispersionObjective, LogNormalPrior};
use super::DispersionParams;
use crate::stats::{mad_squared, trigamma};

/// Prior variance of log dispersions around the trend.
///
/// Returns `(prior_var, var_log_disp_ests)`: the robust variance of the log
/// residuals, less the variance expected from sampling with `m - p` residual
/// degrees of freedom, floored at `min_prior_var`.
pub fn estimate_prior_variance(
    gene_wise: &[Option<f64>],
    trended: &[f64],
    n_samples: usize,
    n_coef: usize,
    params: &DispersionParams,
) -> (f64, f64) {
    let floor = params.min_prior_var;
    let log_residuals: Vec<f64> = gene_wise
        .iter()
        .zip(trended.iter())
        .filter_map(|(g, &t)| g.map(|g| (g, t)))
        .filter(|&(g, t)| g >= 100.0 * params.min_disp && t > 0.0 && g.is_finite() && t.is_finite())
        .map(|(g, t)| g.ln() - t.ln())
        .collect();

    if log_residuals.len() < 3 {
        log::debug!("Fewer than 3 usable log residuals, prior variance set to {}", floor);
        return (floor, floor);
    }

    let var_log_disp_ests = mad_squared(&log_residuals);
    if n_samples <= n_coef {
        return (floor, var_log_disp_ests);
    }

    let df = (n_samples - n_coef) as f64;
    let prior_var = (var_log_disp_ests - trigamma(df / 2.0)).max(floor);

    log::debug!(
        "Prior variance: df={}, var_log_disp_ests={:.4}, prior_var={:.4}",
        df,
        var_log_disp_ests,
        prior_var
    );
    (prior_var, var_log_disp_ests)
}

/// True when the gene-wise estimate lies far above the trend
pub fn is_dispersion_outlier(gene_wise: f64, trend: f64, var_log_disp_ests: f64, outlier_sd: f64) -> bool {
    gene_wise > 0.0
        && trend > 0.0
        && gene_wise.is_finite()
        && trend.is_finite()
        && gene_wise.ln() - trend.ln() > outlier_sd * var_log_disp_ests.sqrt()
}

/// MAP estimate for one gene. Returns `(dispersion, converged)`.
#[allow(clippy::too_many_arguments)]
pub fn fit_map_dispersion(
    counts: &[f64],
    design: &Array2<f64>,
    mu: &[f64],
    gene_wise: f64,
    trend: f64,
    prior_var: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> (f64, bool) {
    let start = if gene_wise > 0.1 * trend { gene_wise } else { trend };
    let lower = params.min_disp.ln();
    let upper = max_disp.ln();

    let objective = DispersionObjective {
        counts,
        mu,
        design,
        prior: Some(LogNormalPrior {
            mean: trend.ln(),
            variance: prior_var,
        }),
    };
    let outcome = maximize_log_dispersion(&objective, start.ln(), lower, upper, params.disp_tol, params.maxit);
    (outcome.log_alpha.exp(), outcome.converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_map_moves_toward_trend() {
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let counts = [80.0, 120.0, 95.0, 300.0, 210.0, 260.0];
        let mu = [98.333, 98.333, 98.333, 256.667, 256.667, 256.667];
        let params = DispersionParams::default();

        let (gene_wise, _) = fit_map_dispersion(&counts, &design, &mu, 0.03, 0.03, 1e6, 10.0, &params);
        let trend = 0.2;
        let (map, converged) = fit_map_dispersion(&counts, &design, &mu, gene_wise, trend, 0.5, 10.0, &params);

        assert!(converged);
        assert!(map > gene_wise && map < trend, "gene-wise {} map {} trend {}", gene_wise, map, trend);
    }

    #[test]
    fn test_prior_variance_floor() {
        let params = DispersionParams::default();
        let (prior, var) = estimate_prior_variance(&[Some(0.1), None], &[0.1, 0.1], 6, 2, &params);
        assert_eq!(prior, 0.25);
        assert_eq!(var, 0.25);

        // Identical residuals: MAD is zero so the floor applies
        let gw = vec![Some(0.1); 10];
        let trend = vec![0.05; 10];
        let (prior, var) = estimate_prior_variance(&gw, &trend, 6, 2, &params);
        assert_eq!(prior, 0.25);
        assert_eq!(var, 0.0);
    }

    #[test]
    fn test_prior_variance_subtracts_sampling_variance() {
        let params = DispersionParams::default();
        let gw: Vec<Option<f64>> = (0..21).map(|i| Some(0.05 * ((i as f64 - 10.0) * 0.4).exp())).collect();
        let trend = vec![0.05; 21];
        let (prior, var) = estimate_prior_variance(&gw, &trend, 12, 2, &params);
        assert!(var > 0.0);
        assert!((prior - (var - trigamma(5.0)).max(0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_outlier_rule() {
        assert!(is_dispersion_outlier(1.0, 0.05, 0.25, 2.0));
        assert!(!is_dispersion_outlier(0.06, 0.05, 0.25, 2.0));
        assert!(!is_dispersion_outlier(1e-9, 0.05, 0.25, 2.0));
    }
}
