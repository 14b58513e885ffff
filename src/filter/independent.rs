//! Independent filtering on mean expression to improve power

use crate::stats::quantile_sorted;
use crate::testing::{benjamini_hochberg, TestingParams};

/// Number of quantile cutoffs tried when optimizing the filter
const N_THETA: usize = 50;
/// At or below this many rejections the optimization is not trusted
const MIN_REJECTIONS_FOR_SEARCH: usize = 10;

/// Adjusted p-values after filtering
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// BH-adjusted p-values; NaN for filtered or untested genes
    pub padj: Vec<f64>,
    /// Base-mean cutoff applied
    pub threshold: f64,
    /// Genes with padj < alpha at that cutoff
    pub rejections: usize,
}

fn adjust_above(pvalues: &[f64], base_means: &[f64], cutoff: f64, alpha: f64) -> (Vec<f64>, usize) {
    let filtered: Vec<f64> = pvalues
        .iter()
        .zip(base_means.iter())
        .map(|(&p, &m)| if m >= cutoff && p.is_finite() { p } else { f64::NAN })
        .collect();
    let padj = benjamini_hochberg(&filtered);
    let rejections = padj.iter().filter(|&&p| p < alpha).count();
    (padj, rejections)
}

/// Filter genes by base mean, then apply Benjamini-Hochberg to the rest.
///
/// With filtering enabled, cutoffs at 50 base-mean quantiles (each at least
/// `min_base_mean`) are tried and the one with the most rejections wins,
/// lowest cutoff on ties. Few rejections overall, or filtering disabled,
/// leave just the `min_base_mean` floor.
pub fn independent_filtering(base_means: &[f64], pvalues: &[f64], params: &TestingParams) -> FilterOutcome {
    let floor = params.min_base_mean;
    let (floor_padj, floor_rej) = adjust_above(pvalues, base_means, floor, params.alpha);
    let fixed = FilterOutcome {
        padj: floor_padj,
        threshold: floor,
        rejections: floor_rej,
    };

    let mut sorted: Vec<f64> = base_means.iter().copied().filter(|m| m.is_finite()).collect();
    if !params.independent_filtering || sorted.is_empty() {
        return fixed;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    let lower = sorted.iter().filter(|&&m| m == 0.0).count() as f64 / n;
    let upper = if lower < 0.95 { 0.95 } else { 1.0 };

    let mut best = fixed;
    let mut max_rej = best.rejections;
    let mut last_cutoff = f64::NAN;
    for j in 0..N_THETA {
        let theta = lower + (upper - lower) * j as f64 / (N_THETA - 1) as f64;
        let cutoff = quantile_sorted(&sorted, theta).max(floor);
        if cutoff == last_cutoff {
            continue;
        }
        last_cutoff = cutoff;

        let (padj, rejections) = adjust_above(pvalues, base_means, cutoff, params.alpha);
        log::debug!("theta={:.3}, cutoff={:.2}, rejections={}", theta, cutoff, rejections);
        max_rej = max_rej.max(rejections);
        if rejections > best.rejections {
            best = FilterOutcome {
                padj,
                threshold: cutoff,
                rejections,
            };
        }
    }

    if max_rej <= MIN_REJECTIONS_FOR_SEARCH {
        let (padj, rejections) = adjust_above(pvalues, base_means, floor, params.alpha);
        best = FilterOutcome {
            padj,
            threshold: floor,
            rejections,
        };
    }

    log::info!(
        "Independent filtering: cutoff {:.2}, {} rejections at alpha {}",
        best.threshold,
        best.rejections,
        params.alpha
    );
    best
}
