//! Results table for one contrast

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::annotation::{GeneSymbol, SymbolResolver};
use crate::error::Result;
use crate::testing::Contrast;

/// Whether a gene reached the Wald test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneStatus {
    Tested,
    /// GLM fit failed; statistics are null
    FitFailure,
}

/// One gene's row in the results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub gene_id: String,
    pub base_mean: f64,
    pub log2_fold_change: Option<f64>,
    pub lfc_se: Option<f64>,
    pub stat: Option<f64>,
    pub pvalue: Option<f64>,
    /// `None` when independent filtering removed the gene
    pub padj: Option<f64>,
    /// Final dispersion used in the GLM
    pub dispersion: f64,
    pub dispersion_outlier: bool,
    pub gene_wise_converged: bool,
    pub status: GeneStatus,
    pub significant: bool,
    pub symbol: Option<GeneSymbol>,
}

impl ResultRow {
    pub fn is_up(&self) -> bool {
        self.significant && self.log2_fold_change.is_some_and(|l| l > 0.0)
    }

    pub fn is_down(&self) -> bool {
        self.significant && self.log2_fold_change.is_some_and(|l| l < 0.0)
    }
}

/// Differential expression results, one row per gene with a final dispersion,
/// in count-matrix order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    pub contrast: Contrast,
    pub alpha: f64,
    pub lfc_threshold: f64,
    /// Base-mean cutoff chosen by independent filtering
    pub filter_threshold: f64,
    pub rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn n_genes(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, gene_id: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.gene_id == gene_id)
    }

    pub fn significant(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| r.significant)
    }

    /// Attach symbols from `resolver`. Statistics are left untouched.
    pub fn with_symbols<R: SymbolResolver + ?Sized>(mut self, resolver: &R) -> Result<Self> {
        let ids: Vec<String> = self.rows.iter().map(|r| r.gene_id.clone()).collect();
        let mut resolved: HashMap<String, GeneSymbol> = resolver.resolve(&ids)?;
        for row in &mut self.rows {
            row.symbol = Some(resolved.remove(&row.gene_id).unwrap_or(GeneSymbol::Unresolved));
        }
        log::info!(
            "Resolved symbols for {}/{} genes",
            self.rows
                .iter()
                .filter(|r| matches!(r.symbol, Some(GeneSymbol::Resolved(_))))
                .count(),
            self.rows.len()
        );
        Ok(self)
    }

    pub fn summary(&self) -> ResultsSummary {
        let tested = self.rows.iter().filter(|r| r.pvalue.is_some()).count();
        ResultsSummary {
            total_genes: self.rows.len(),
            genes_tested: tested,
            filtered: self
                .rows
                .iter()
                .filter(|r| r.pvalue.is_some() && r.padj.is_none())
                .count(),
            significant: self.significant().count(),
            upregulated: self.rows.iter().filter(|r| r.is_up()).count(),
            downregulated: self.rows.iter().filter(|r| r.is_down()).count(),
            dispersion_outliers: self.rows.iter().filter(|r| r.dispersion_outlier).count(),
            fit_failures: self
                .rows
                .iter()
                .filter(|r| r.status == GeneStatus::FitFailure)
                .count(),
            alpha: self.alpha,
            lfc_threshold: self.lfc_threshold,
            filter_threshold: self.filter_threshold,
        }
    }
}

/// Counts over a results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub total_genes: usize,
    pub genes_tested: usize,
    /// Tested but removed by independent filtering
    pub filtered: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub dispersion_outliers: usize,
    pub fit_failures: usize,
    pub alpha: f64,
    pub lfc_threshold: f64,
    pub filter_threshold: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Differential Expression Summary")?;
        writeln!(f, "===============================")?;
        writeln!(f, "Total genes: {}", self.total_genes)?;
        writeln!(f, "Genes tested: {}", self.genes_tested)?;
        writeln!(
            f,
            "Filtered (mean count < {:.2}): {}",
            self.filter_threshold, self.filtered
        )?;
        writeln!(
            f,
            "Significant (padj < {}, |LFC| > {}): {}",
            self.alpha, self.lfc_threshold, self.significant
        )?;
        writeln!(f, "  Up-regulated: {}", self.upregulated)?;
        writeln!(f, "  Down-regulated: {}", self.downregulated)?;
        writeln!(f, "Dispersion outliers: {}", self.dispersion_outliers)?;
        writeln!(f, "Fit failures: {}", self.fit_failures)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::SymbolTable;

    fn row(gene_id: &str, lfc: f64, padj: Option<f64>, significant: bool) -> ResultRow {
        ResultRow {
            gene_id: gene_id.to_string(),
            base_mean: 100.0,
            log2_fold_change: Some(lfc),
            lfc_se: Some(0.2),
            stat: Some(lfc / 0.2),
            pvalue: Some(0.01),
            padj,
            dispersion: 0.05,
            dispersion_outlier: false,
            gene_wise_converged: true,
            status: GeneStatus::Tested,
            significant,
            symbol: None,
        }
    }

    fn table() -> ResultsTable {
        let mut failed = row("g4", 0.0, None, false);
        failed.log2_fold_change = None;
        failed.lfc_se = None;
        failed.stat = None;
        failed.pvalue = None;
        failed.status = GeneStatus::FitFailure;

        let mut outlier = row("g3", 0.1, None, false);
        outlier.dispersion_outlier = true;

        ResultsTable {
            contrast: Contrast::new("condition", "treated", "untreated"),
            alpha: 0.05,
            lfc_threshold: 0.5,
            filter_threshold: 10.0,
            rows: vec![
                row("g1", 2.3, Some(0.001), true),
                row("g2", -1.1, Some(0.02), true),
                outlier,
                failed,
            ],
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = table().summary();
        assert_eq!(summary.total_genes, 4);
        assert_eq!(summary.genes_tested, 3);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.significant, 2);
        assert_eq!(summary.upregulated, 1);
        assert_eq!(summary.downregulated, 1);
        assert_eq!(summary.dispersion_outliers, 1);
        assert_eq!(summary.fit_failures, 1);

        let text = summary.to_string();
        assert!(text.contains("Up-regulated: 1"));
        assert!(text.contains("Fit failures: 1"));
    }

    #[test]
    fn test_with_symbols_leaves_statistics_alone() {
        let before = table();
        let symbols: SymbolTable = [("g1", "TP53")].into_iter().collect();
        let after = before.clone().with_symbols(&symbols).unwrap();

        assert_eq!(after.get("g1").unwrap().symbol, Some(GeneSymbol::Resolved("TP53".to_string())));
        assert_eq!(after.get("g2").unwrap().symbol, Some(GeneSymbol::Unresolved));
        for (a, b) in before.rows.iter().zip(after.rows.iter()) {
            assert_eq!(a.log2_fold_change, b.log2_fold_change);
            assert_eq!(a.padj, b.padj);
            assert_eq!(a.significant, b.significant);
        }
    }
}
