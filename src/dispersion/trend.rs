//! Dispersion-mean trend fitting

use serde::{Deserialize, Serialize};

use crate::error::{DiffExprError, Result};

/// Residual ratios outside this open interval are excluded from the next fit
const RESIDUAL_BOUNDS: (f64, f64) = (1e-4, 15.0);
const MAX_OUTER_ITER: usize = 11;
const COEF_TOL: f64 = 1e-6;
const GAMMA_IRLS_MAXIT: usize = 25;
const GAMMA_IRLS_TOL: f64 = 1e-8;

/// How the trend was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendKind {
    /// dispersion = extra_pois / mean + asympt_disp
    Parametric,
    /// Constant mean of the gene-wise estimates
    Mean,
}

/// Fitted dispersion trend as a function of base mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispersionTrend {
    /// Asymptotic dispersion for highly expressed genes (b)
    pub asympt_disp: f64,
    /// Extra-Poisson term scaling with 1/mean (a)
    pub extra_pois: f64,
    pub kind: TrendKind,
}

impl DispersionTrend {
    pub fn constant(value: f64) -> Self {
        Self {
            asympt_disp: value,
            extra_pois: 0.0,
            kind: TrendKind::Mean,
        }
    }

    /// Trended dispersion at a base mean
    pub fn eval(&self, mean: f64) -> f64 {
        match self.kind {
            TrendKind::Mean => self.asympt_disp,
            TrendKind::Parametric if mean > 0.0 => self.asympt_disp + self.extra_pois / mean,
            TrendKind::Parametric => self.asympt_disp,
        }
    }
}

/// Fit the trend, falling back to the mean of the gene-wise estimates when the
/// parametric fit fails.
///
/// Only genes with a gene-wise estimate above `100 * min_disp` and a positive
/// base mean enter the parametric fit.
pub fn fit_dispersion_trend(means: &[f64], gene_wise: &[Option<f64>], min_disp: f64) -> Result<DispersionTrend> {
    let usable: Vec<(f64, f64)> = means
        .iter()
        .zip(gene_wise.iter())
        .filter_map(|(&m, d)| d.map(|d| (m, d)))
        .filter(|&(m, d)| m > 0.0 && d.is_finite() && d > 100.0 * min_disp)
        .collect();

    match fit_parametric_trend(&usable) {
        Ok(trend) => {
            log::info!(
                "Fitted dispersion trend: {:.4e}/mean + {:.4e} from {} genes",
                trend.extra_pois,
                trend.asympt_disp,
                usable.len()
            );
            Ok(trend)
        }
        Err(e) => {
            log::warn!("Parametric dispersion trend failed ({}), using mean dispersion", e);
            fit_mean_trend(gene_wise, min_disp)
        }
    }
}

/// Trimmed mean of gene-wise estimates above `10 * min_disp`
pub fn fit_mean_trend(gene_wise: &[Option<f64>], min_disp: f64) -> Result<DispersionTrend> {
    let finite: Vec<f64> = gene_wise.iter().flatten().copied().filter(|d| d.is_finite()).collect();
    if finite.is_empty() {
        return Err(DiffExprError::DegenerateInput {
            reason: "no gene has a gene-wise dispersion estimate".to_string(),
        });
    }

    let mut valid: Vec<f64> = finite.iter().copied().filter(|&d| d > 10.0 * min_disp).collect();
    if valid.is_empty() {
        return Ok(DispersionTrend::constant(min_disp));
    }

    valid.sort_by(|a, b| a.total_cmp(b));
    let n = valid.len();
    let trim = ((n as f64) * 0.001).floor() as usize;
    let trimmed = &valid[trim..n - trim];
    let mean = trimmed.iter().sum::<f64>() / trimmed.len() as f64;
    Ok(DispersionTrend::constant(mean))
}

/// Iterated gamma-family fit of dispersion on 1/mean with residual filtering.
fn fit_parametric_trend(data: &[(f64, f64)]) -> Result<DispersionTrend> {
    if data.len() < 3 {
        return Err(DiffExprError::DegenerateInput {
            reason: format!("{} genes usable for the trend, at least 3 required", data.len()),
        });
    }

    let mut coefs = (0.1_f64, 1.0_f64);
    for iter in 0..MAX_OUTER_ITER {
        let old = coefs;

        let good: Vec<(f64, f64)> = data
            .iter()
            .filter(|&&(mean, disp)| {
                let fitted = coefs.0 + coefs.1 / mean;
                let ratio = disp / fitted;
                fitted > 0.0 && ratio > RESIDUAL_BOUNDS.0 && ratio < RESIDUAL_BOUNDS.1
            })
            .copied()
            .collect();

        if good.len() < 3 {
            return Err(DiffExprError::DegenerateInput {
                reason: "fewer than 3 genes within the residual bounds".to_string(),
            });
        }

        let (new_coefs, glm_converged) = fit_gamma_identity(&good, coefs);
        coefs = new_coefs;
        log::debug!(
            "Trend iteration {}: {} genes, asympt_disp={:.6}, extra_pois={:.6}",
            iter + 1,
            good.len(),
            coefs.0,
            coefs.1
        );

        if !(coefs.0 > 0.0 && coefs.1 > 0.0) {
            return Err(DiffExprError::DegenerateInput {
                reason: format!(
                    "trend coefficients not positive (asympt_disp={:.4e}, extra_pois={:.4e})",
                    coefs.0, coefs.1
                ),
            });
        }

        let change = (coefs.0 / old.0).ln().powi(2) + (coefs.1 / old.1).ln().powi(2);
        if change < COEF_TOL && glm_converged {
            return Ok(DispersionTrend {
                asympt_disp: coefs.0,
                extra_pois: coefs.1,
                kind: TrendKind::Parametric,
            });
        }
    }

    Err(DiffExprError::DegenerateInput {
        reason: format!("trend fit did not converge in {} iterations", MAX_OUTER_ITER),
    })
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(mean, disp)| {
            let mu = (a0 + a1 / mean).max(1e-8);
            2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
        })
        .sum()
}

/// Gamma GLM with identity link, disp ~ 1 + 1/mean, by IRLS with weights 1/mu^2.
/// Returns ((intercept, slope), converged).
fn fit_gamma_identity(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..GAMMA_IRLS_MAXIT {
        let (mut sw, mut swx, mut swz, mut swxx, mut swxz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(mean, disp) in data {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swz += w * disp;
            swxx += w * x * x;
            swxz += w * x * disp;
        }

        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-300 || !det.is_finite() {
            return ((a0, a1), false);
        }
        a0 = (swxx * swz - swx * swxz) / det;
        a1 = (sw * swxz - swx * swz) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < GAMMA_IRLS_TOL {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }

    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_trend_recovers_coefficients() {
        let means: Vec<f64> = (0..40).map(|i| 10.0 * 1.15f64.powi(i)).collect();
        let disps: Vec<Option<f64>> = means.iter().map(|&m| Some(2.0 / m + 0.05)).collect();

        let trend = fit_dispersion_trend(&means, &disps, 1e-8).unwrap();
        assert_eq!(trend.kind, TrendKind::Parametric);
        assert!((trend.extra_pois - 2.0).abs() < 1e-6);
        assert!((trend.asympt_disp - 0.05).abs() < 1e-6);
        assert!((trend.eval(100.0) - 0.07).abs() < 1e-6);
    }

    #[test]
    fn test_falls_back_to_mean() {
        // Dispersion increasing with mean: slope would be negative
        let means = vec![10.0, 100.0, 1000.0, 10000.0];
        let disps = vec![Some(0.01), Some(0.02), Some(0.03), Some(0.04)];

        let trend = fit_dispersion_trend(&means, &disps, 1e-8).unwrap();
        assert_eq!(trend.kind, TrendKind::Mean);
        assert!((trend.eval(50.0) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_no_estimates_is_degenerate() {
        let result = fit_dispersion_trend(&[10.0, 20.0], &[None, None], 1e-8);
        assert!(matches!(result, Err(DiffExprError::DegenerateInput { .. })));

        let floor = fit_mean_trend(&[Some(1e-8), Some(1e-8)], 1e-8).unwrap();
        assert_eq!(floor.eval(10.0), 1e-8);
    }
}
