//! Wald test for differential expression

use super::pvalue::calculate_pvalue;
use crate::glm::GeneFit;

/// Wald test of one contrast for one gene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaldResult {
    pub log2_fold_change: f64,
    pub lfc_se: f64,
    pub stat: f64,
    pub pvalue: f64,
}

/// Test c'beta = 0 with variance c' Sigma c.
///
/// Coefficients are natural-log effects; fold change and its standard error
/// are reported on the log2 scale. `None` when the contrast variance is not
/// positive.
pub fn wald_test(fit: &GeneFit, contrast: &[f64]) -> Option<WaldResult> {
    let estimate: f64 = contrast.iter().zip(fit.coefficients.iter()).map(|(c, b)| c * b).sum();

    let p = contrast.len();
    let mut variance = 0.0;
    for j in 0..p {
        for k in 0..p {
            variance += contrast[j] * fit.covariance[[j, k]] * contrast[k];
        }
    }
    if variance <= 0.0 || !variance.is_finite() || !estimate.is_finite() {
        return None;
    }

    let se = variance.sqrt();
    let stat = estimate / se;
    let ln2 = std::f64::consts::LN_2;
    Some(WaldResult {
        log2_fold_change: estimate / ln2,
        lfc_se: se / ln2,
        stat,
        pvalue: calculate_pvalue(stat),
    })
}
