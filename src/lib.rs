//! diffexpr: negative binomial differential expression analysis of RNA-seq counts
//!
//! A run validates a count matrix against its sample metadata, normalizes by
//! median-of-ratios size factors, estimates and shrinks per-gene dispersions,
//! fits a negative binomial GLM per gene and reports Wald tests for one
//! contrast with independent filtering and Benjamini-Hochberg adjustment.
//!
//! # Example
//!
//! ```ignore
//! use diffexpr::prelude::*;
//!
//! let counts = CountMatrix::from_rows(rows, sample_ids.clone())?;
//! let mut metadata = SampleMetadata::new(sample_ids);
//! metadata.add_factor("condition", conditions)?;
//!
//! let contrast = Contrast::new("condition", "treated", "untreated");
//! let analysis = run_analysis(&counts, &metadata, "condition", &contrast, &PipelineConfig::default())?;
//! println!("{}", analysis.results.summary());
//! ```

pub mod annotation;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod filter;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::annotation::{GeneInfo, GeneInfoFetcher, GeneSymbol, SymbolResolver, SymbolTable};
    pub use crate::config::PipelineConfig;
    pub use crate::data::{CountMatrix, SampleMetadata, ValidatedDataset, ValidationParams};
    pub use crate::dispersion::{estimate_dispersions, DispersionEstimates, DispersionParams};
    pub use crate::error::{DiffExprError, Result};
    pub use crate::glm::{fit_glm, GlmFitParams, GlmFits};
    pub use crate::io::{write_results, write_results_file, GeneStatus, ResultRow, ResultsSummary, ResultsTable};
    pub use crate::normalization::{estimate_size_factors, SizeFactorParams, SizeFactors};
    pub use crate::testing::{results, Contrast, TestingParams};
    pub use crate::{run_analysis, Analysis};
}

use prelude::*;

/// Every stage output of one run, kept for diagnostics
#[derive(Debug, Clone)]
pub struct Analysis {
    pub dataset: ValidatedDataset,
    pub size_factors: SizeFactors,
    pub dispersions: DispersionEstimates,
    pub fits: GlmFits,
    pub results: ResultsTable,
}

/// Run the complete pipeline for one contrast.
///
/// Inputs are validated and the contrast checked before any numerical work.
/// With `config.threads` set, every parallel stage runs in a dedicated pool
/// of that size.
pub fn run_analysis(
    counts: &CountMatrix,
    metadata: &SampleMetadata,
    design_factor: &str,
    contrast: &Contrast,
    config: &PipelineConfig,
) -> Result<Analysis> {
    match config.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            log::debug!("Running in a dedicated pool of {} threads", n);
            pool.install(|| run_stages(counts, metadata, design_factor, contrast, config))
        }
        None => run_stages(counts, metadata, design_factor, contrast, config),
    }
}

fn run_stages(
    counts: &CountMatrix,
    metadata: &SampleMetadata,
    design_factor: &str,
    contrast: &Contrast,
    config: &PipelineConfig,
) -> Result<Analysis> {
    // Step 1: Validate inputs, pre-filter genes and check the contrast
    let dataset = ValidatedDataset::new(counts, metadata, design_factor, &config.validation)?;
    contrast.validate(&dataset)?;

    // Step 2: Size factors
    let size_factors = estimate_size_factors(dataset.counts(), &config.size_factors)?;

    // Step 3: Dispersions
    let dispersions = estimate_dispersions(&dataset, &size_factors, &config.dispersion)?;

    // Step 4: GLM fits
    let fits = fit_glm(&dataset, &size_factors, &dispersions, &config.glm)?;

    // Step 5: Wald tests, filtering and significance
    let results = results(&dataset, &size_factors, &dispersions, &fits, contrast, &config.testing)?;

    Ok(Analysis {
        dataset,
        size_factors,
        dispersions,
        fits,
        results,
    })
}
