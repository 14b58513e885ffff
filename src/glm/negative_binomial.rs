//! Negative binomial distribution utilities

use statrs::function::gamma::ln_gamma;

/// Floor applied to fitted means before weights are computed
pub const MIN_MU: f64 = 0.5;

/// Coefficients beyond this magnitude (natural log scale) mark a diverged fit
pub const MAX_BETA: f64 = 30.0;

/// Linear predictors are clamped here to keep exp() finite
pub const MAX_ETA: f64 = 700.0;

/// mu = size_factor * exp(eta)
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// Var(Y) = mu + alpha * mu^2
pub fn nb_variance(mu: f64, alpha: f64) -> f64 {
    mu + alpha * mu * mu
}

/// Log-probability of count `k` under NB(mu, alpha), with r = 1/alpha.
pub fn nb_log_likelihood(k: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let r = 1.0 / alpha;
    let p = alpha * mu / (1.0 + alpha * mu);

    ln_gamma(k + r) - ln_gamma(r) - ln_gamma(k + 1.0) + r * (1.0 - p).ln() + k * p.ln()
}

/// -2 log-likelihood of a gene's counts
pub fn nb_deviance(counts: &[f64], mu: &[f64], alpha: f64) -> f64 {
    -2.0 * counts
        .iter()
        .zip(mu.iter())
        .map(|(&y, &m)| nb_log_likelihood(y, m, alpha))
        .sum::<f64>()
}

/// IRLS working weight, W = mu / (1 + alpha * mu)
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean_and_variance() {
        assert!((nb_mean(2.0, 1.5) - 1.5 * 2.0_f64.exp()).abs() < 1e-10);
        assert!(nb_mean(1e6, 1.0).is_finite());
        assert!((nb_variance(10.0, 0.1) - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_nb_log_likelihood_near_poisson() {
        // Small alpha approaches the Poisson log-probability
        let ll = nb_log_likelihood(5.0, 5.0, 1e-6);
        let poisson = 5.0 * 5f64.ln() - 5.0 - ln_gamma(6.0);
        assert!((ll - poisson).abs() < 1e-4);
        assert_eq!(nb_log_likelihood(1.0, 0.0, 0.1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_deviance_and_weight() {
        let dev = nb_deviance(&[3.0, 4.0], &[3.0, 4.0], 0.1);
        assert!(dev > 0.0 && dev.is_finite());
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-10);
    }
}
