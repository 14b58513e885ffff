//! Cox-Reid adjusted NB likelihood in log dispersion and its maximizer
//!
//! Both the gene-wise MLE and the MAP step maximize the same objective over
//! theta = ln(alpha); the MAP step adds a normal prior on theta.

use ndarray::Array2;
use statrs::function::gamma::{digamma, ln_gamma};

use crate::glm::linalg::{invert_symmetric, log_determinant_symmetric, weighted_crossprod};

/// Step for the finite-difference curvature, in log dispersion
const CURVATURE_EPS: f64 = 1e-4;
/// Largest Newton step allowed in log dispersion
const MAX_STEP: f64 = 1.0;
/// Step halvings tried before declaring that no ascent is possible
const MAX_HALVINGS: usize = 30;

/// Normal prior on ln(alpha)
#[derive(Debug, Clone, Copy)]
pub(crate) struct LogNormalPrior {
    pub mean: f64,
    pub variance: f64,
}

/// Objective for one gene: counts and fitted means stay fixed, only the
/// dispersion varies.
pub(crate) struct DispersionObjective<'a> {
    pub counts: &'a [f64],
    pub mu: &'a [f64],
    pub design: &'a Array2<f64>,
    pub prior: Option<LogNormalPrior>,
}

impl DispersionObjective<'_> {
    fn cox_reid_weights(&self, alpha: f64) -> Vec<f64> {
        self.mu.iter().map(|&m| 1.0 / (1.0 / m + alpha)).collect()
    }

    /// Log-likelihood with Cox-Reid adjustment, plus the prior if set
    pub fn log_posterior(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let r = 1.0 / alpha;

        let ll: f64 = self
            .counts
            .iter()
            .zip(self.mu.iter())
            .map(|(&y, &m)| ln_gamma(y + r) - ln_gamma(r) - y * (m + r).ln() - r * (1.0 + m * alpha).ln())
            .sum();

        let xtwx = weighted_crossprod(self.design, &self.cox_reid_weights(alpha));
        let cr = log_determinant_symmetric(&xtwx).map_or(0.0, |ld| -0.5 * ld);

        ll + cr + self.log_prior(log_alpha)
    }

    /// Derivative of [`log_posterior`](Self::log_posterior) in ln(alpha)
    pub fn gradient(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let alpha_sq = alpha * alpha;
        let r = 1.0 / alpha;

        let dll_dalpha: f64 = self
            .counts
            .iter()
            .zip(self.mu.iter())
            .map(|(&y, &m)| {
                (digamma(r) + (1.0 + m * alpha).ln() - m * alpha / (1.0 + m * alpha) - digamma(y + r)
                    + y * alpha / (1.0 + m * alpha))
                    / alpha_sq
            })
            .sum();

        // d/dalpha of -0.5 log|B| = -0.5 tr(B^-1 dB), with dw/dalpha = -w^2
        let w = self.cox_reid_weights(alpha);
        let dw: Vec<f64> = w.iter().map(|&wi| -wi * wi).collect();
        let b = weighted_crossprod(self.design, &w);
        let db = weighted_crossprod(self.design, &dw);
        let dcr_dalpha = invert_symmetric(&b).map_or(0.0, |b_inv| {
            let trace: f64 = (0..b.nrows())
                .map(|j| (0..b.nrows()).map(|k| b_inv[[j, k]] * db[[k, j]]).sum::<f64>())
                .sum();
            -0.5 * trace
        });

        (dll_dalpha + dcr_dalpha) * alpha + self.d_log_prior(log_alpha)
    }

    fn log_prior(&self, log_alpha: f64) -> f64 {
        self.prior
            .map_or(0.0, |p| -(log_alpha - p.mean).powi(2) / (2.0 * p.variance))
    }

    fn d_log_prior(&self, log_alpha: f64) -> f64 {
        self.prior.map_or(0.0, |p| -(log_alpha - p.mean) / p.variance)
    }
}

/// Result of maximizing over ln(alpha)
#[derive(Debug, Clone, Copy)]
pub(crate) struct MaximizeOutcome {
    pub log_alpha: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Newton-Raphson ascent on ln(alpha) within `[lower, upper]`.
///
/// Uses the analytic gradient and a central-difference curvature; where the
/// curvature is not negative the step follows the gradient instead. Every
/// accepted step strictly increases the objective. On running out of
/// iterations the last iterate is returned with `converged = false`.
pub(crate) fn maximize_log_dispersion(
    objective: &DispersionObjective<'_>,
    start: f64,
    lower: f64,
    upper: f64,
    tol: f64,
    maxit: usize,
) -> MaximizeOutcome {
    let mut theta = start.clamp(lower, upper);
    let mut lp = objective.log_posterior(theta);

    for iter in 1..=maxit {
        let g = objective.gradient(theta);
        if !g.is_finite() || !lp.is_finite() {
            return MaximizeOutcome {
                log_alpha: theta,
                converged: false,
                iterations: iter,
            };
        }

        let at_lower = theta <= lower && g <= 0.0;
        let at_upper = theta >= upper && g >= 0.0;
        if g == 0.0 || at_lower || at_upper {
            return MaximizeOutcome {
                log_alpha: theta,
                converged: true,
                iterations: iter,
            };
        }

        let curvature = (objective.gradient(theta + CURVATURE_EPS) - objective.gradient(theta - CURVATURE_EPS))
            / (2.0 * CURVATURE_EPS);
        let mut step = if curvature < 0.0 && curvature.is_finite() {
            -g / curvature
        } else {
            g.signum() * g.abs().min(MAX_STEP)
        };
        step = step.clamp(-MAX_STEP, MAX_STEP);

        let mut accepted = None;
        for _ in 0..MAX_HALVINGS {
            let candidate = (theta + step).clamp(lower, upper);
            let lp_candidate = objective.log_posterior(candidate);
            if lp_candidate > lp {
                accepted = Some((candidate, lp_candidate));
                break;
            }
            step /= 2.0;
        }

        match accepted {
            // No ascent along the gradient: a maximum within tolerance
            None => {
                return MaximizeOutcome {
                    log_alpha: theta,
                    converged: true,
                    iterations: iter,
                }
            }
            Some((candidate, lp_candidate)) => {
                let delta = (candidate - theta).abs();
                theta = candidate;
                lp = lp_candidate;
                if delta < tol {
                    return MaximizeOutcome {
                        log_alpha: theta,
                        converged: true,
                        iterations: iter,
                    };
                }
            }
        }
    }

    MaximizeOutcome {
        log_alpha: theta,
        converged: false,
        iterations: maxit,
    }
}
