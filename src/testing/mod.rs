//! Statistical testing for differential expression

mod contrast;
mod fdr;
mod pvalue;
mod wald;

pub use contrast::Contrast;
pub use fdr::benjamini_hochberg;
pub use pvalue::calculate_pvalue;
pub use wald::{wald_test, WaldResult};

use serde::{Deserialize, Serialize};

use crate::data::ValidatedDataset;
use crate::dispersion::DispersionEstimates;
use crate::error::Result;
use crate::filter::independent_filtering;
use crate::glm::{GeneGlm, GlmFits};
use crate::io::{GeneStatus, ResultRow, ResultsTable};
use crate::normalization::{base_means, SizeFactors};

/// Parameters for testing, filtering and the significance call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingParams {
    /// Adjusted p-value cutoff
    pub alpha: f64,
    /// Minimum absolute log2 fold change for a significant call
    pub lfc_threshold: f64,
    /// Base-mean floor applied before BH adjustment
    pub min_base_mean: f64,
    /// Search for a higher base-mean cutoff that maximizes rejections
    pub independent_filtering: bool,
}

impl Default for TestingParams {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            lfc_threshold: 0.5,
            min_base_mean: 10.0,
            independent_filtering: true,
        }
    }
}

/// Wald test every fitted gene for `contrast`, then filter, adjust and call
/// significance.
///
/// Genes without a final dispersion are left out of the table. Genes whose
/// GLM fit failed appear with null statistics.
pub fn results(
    dataset: &ValidatedDataset,
    size_factors: &SizeFactors,
    dispersions: &DispersionEstimates,
    fits: &GlmFits,
    contrast: &Contrast,
    params: &TestingParams,
) -> Result<ResultsTable> {
    contrast.validate(dataset)?;
    let contrast_vector = contrast.vector(&fits.design.info)?;
    log::debug!("Contrast {} -> coefficient weights {:?}", contrast, contrast_vector);

    let means = base_means(dataset.counts(), size_factors);
    let gene_ids = dataset.counts().gene_ids();

    let mut rows = Vec::with_capacity(dataset.n_genes());
    for (i, gene_id) in gene_ids.iter().enumerate() {
        let disp = &dispersions.genes[i];
        let Some(dispersion) = disp.final_dispersion else {
            continue;
        };

        let wald = match &fits.genes[i] {
            GeneGlm::Fitted(fit) => {
                let outcome = wald_test(fit, &contrast_vector);
                if outcome.is_none() {
                    log::warn!("Gene {} has a non-positive contrast variance", gene_id);
                }
                outcome
            }
            GeneGlm::FitFailure { .. } | GeneGlm::NoDispersion => None,
        };

        rows.push(ResultRow {
            gene_id: gene_id.clone(),
            base_mean: means[i],
            log2_fold_change: wald.map(|w| w.log2_fold_change),
            lfc_se: wald.map(|w| w.lfc_se),
            stat: wald.map(|w| w.stat),
            pvalue: wald.map(|w| w.pvalue).filter(|p| p.is_finite()),
            padj: None,
            dispersion,
            dispersion_outlier: disp.outlier,
            gene_wise_converged: disp.gene_wise_converged,
            status: if wald.is_some() {
                GeneStatus::Tested
            } else {
                GeneStatus::FitFailure
            },
            significant: false,
            symbol: None,
        });
    }

    let row_means: Vec<f64> = rows.iter().map(|r| r.base_mean).collect();
    let pvalues: Vec<f64> = rows.iter().map(|r| r.pvalue.unwrap_or(f64::NAN)).collect();
    let filtered = independent_filtering(&row_means, &pvalues, params);

    for (row, &padj) in rows.iter_mut().zip(filtered.padj.iter()) {
        row.padj = Some(padj).filter(|p| p.is_finite());
        row.significant = match (row.padj, row.log2_fold_change) {
            (Some(p), Some(lfc)) => p < params.alpha && lfc.abs() > params.lfc_threshold,
            _ => false,
        };
    }

    let table = ResultsTable {
        contrast: contrast.clone(),
        alpha: params.alpha,
        lfc_threshold: params.lfc_threshold,
        filter_threshold: filtered.threshold,
        rows,
    };
    let summary = table.summary();
    log::info!(
        "Results for {}: {} genes, {} tested, {} significant ({} up, {} down)",
        contrast,
        summary.total_genes,
        summary.genes_tested,
        summary.significant,
        summary.upregulated,
        summary.downregulated
    );
    Ok(table)
}
