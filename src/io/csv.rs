//! CSV export of results tables

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::results::{GeneStatus, ResultRow, ResultsTable};

/// Flat CSV record; null statistics are written as empty fields
#[derive(Serialize)]
struct ResultRecord<'a> {
    gene_id: &'a str,
    symbol: Option<&'a str>,
    #[serde(rename = "baseMean")]
    base_mean: f64,
    #[serde(rename = "log2FoldChange")]
    log2_fold_change: Option<f64>,
    #[serde(rename = "lfcSE")]
    lfc_se: Option<f64>,
    stat: Option<f64>,
    pvalue: Option<f64>,
    padj: Option<f64>,
    dispersion: f64,
    dispersion_outlier: bool,
    gene_wise_converged: bool,
    status: &'static str,
    significant: bool,
}

impl<'a> From<&'a ResultRow> for ResultRecord<'a> {
    fn from(row: &'a ResultRow) -> Self {
        Self {
            gene_id: &row.gene_id,
            symbol: row.symbol.as_ref().and_then(|s| s.as_str()),
            base_mean: row.base_mean,
            log2_fold_change: row.log2_fold_change,
            lfc_se: row.lfc_se,
            stat: row.stat,
            pvalue: row.pvalue,
            padj: row.padj,
            dispersion: row.dispersion,
            dispersion_outlier: row.dispersion_outlier,
            gene_wise_converged: row.gene_wise_converged,
            status: match row.status {
                GeneStatus::Tested => "tested",
                GeneStatus::FitFailure => "fit_failure",
            },
            significant: row.significant,
        }
    }
}

/// Write a results table as CSV with a header row.
pub fn write_results<W: Write>(writer: W, results: &ResultsTable) -> crate::error::Result<()> {
    let mut csv_writer = ::csv::Writer::from_writer(writer);
    for row in &results.rows {
        csv_writer.serialize(ResultRecord::from(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write a results table to a CSV file at `path`
pub fn write_results_file<P: AsRef<Path>>(path: P, results: &ResultsTable) -> crate::error::Result<()> {
    let file = File::create(path.as_ref())?;
    write_results(file, results)?;
    log::info!("Wrote {} result rows to {}", results.n_genes(), path.as_ref().display());
    Ok(())
}
