//! Validated dataset: the gate every run passes before numerical work

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{CountMatrix, SampleMetadata};
use crate::error::{DiffExprError, Result};

/// Parameters for the validation gate and the gene pre-filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    /// Genes with a total count below this are removed before analysis
    pub min_total_count: f64,
    /// Reference level of the design factor; alphabetically first when unset
    pub reference_level: Option<String>,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            min_total_count: 10.0,
            reference_level: None,
        }
    }
}

/// Counts and design after schema, design and pre-filter checks.
///
/// Samples keep the column order of the count matrix; each sample's level of
/// the design factor is stored in the same order.
#[derive(Debug, Clone)]
pub struct ValidatedDataset {
    counts: CountMatrix,
    design_factor: String,
    sample_levels: Vec<String>,
    /// Sorted levels with the reference level first
    levels: Vec<String>,
    excluded_genes: Vec<String>,
}

impl ValidatedDataset {
    pub fn new(
        counts: &CountMatrix,
        metadata: &SampleMetadata,
        design_factor: &str,
        params: &ValidationParams,
    ) -> Result<Self> {
        check_sample_sets(counts, metadata)?;

        if !metadata.has_factor(design_factor) {
            return Err(DiffExprError::Design {
                reason: format!(
                    "design factor '{}' not found in sample metadata (factors: {:?})",
                    design_factor,
                    metadata.factor_names()
                ),
            });
        }
        let values = metadata.factor(design_factor).unwrap_or_default();
        if values.len() != metadata.n_samples() {
            return Err(DiffExprError::Schema {
                reason: format!(
                    "design factor '{}' has {} values for {} samples",
                    design_factor,
                    values.len(),
                    metadata.n_samples()
                ),
            });
        }

        // Align metadata rows to count columns
        let mut sample_levels = Vec::with_capacity(counts.n_samples());
        for sample_id in counts.sample_ids() {
            let idx = metadata
                .sample_ids()
                .iter()
                .position(|id| id == sample_id)
                .ok_or_else(|| DiffExprError::Schema {
                    reason: format!("sample '{}' missing from metadata", sample_id),
                })?;
            let entry = values.get(idx).ok_or_else(|| DiffExprError::Schema {
                reason: format!("design factor '{}' has no entry for sample '{}'", design_factor, sample_id),
            })?;
            let level = entry.clone().ok_or_else(|| DiffExprError::Design {
                reason: format!(
                    "design factor '{}' has no value for sample '{}'",
                    design_factor, sample_id
                ),
            })?;
            sample_levels.push(level);
        }

        let mut levels: Vec<String> = sample_levels.clone();
        levels.sort();
        levels.dedup();

        if levels.len() < 2 {
            return Err(DiffExprError::Design {
                reason: format!(
                    "design factor '{}' needs at least two levels, found {}",
                    design_factor,
                    levels.len()
                ),
            });
        }

        if let Some(reference) = &params.reference_level {
            let pos = levels.iter().position(|l| l == reference).ok_or_else(|| DiffExprError::Design {
                reason: format!(
                    "reference level '{}' is not a level of '{}' (levels: {:?})",
                    reference, design_factor, levels
                ),
            })?;
            let reference = levels.remove(pos);
            levels.insert(0, reference);
        }

        if counts.n_samples() <= levels.len() {
            return Err(DiffExprError::Design {
                reason: format!(
                    "{} samples for {} levels leaves no residual degrees of freedom; replicates are required",
                    counts.n_samples(),
                    levels.len()
                ),
            });
        }

        let (filtered, excluded_genes) = counts.filter_by_total(params.min_total_count)?;
        log::info!(
            "Validated {} samples across {} levels of '{}'; {} genes kept, {} removed with total count < {}",
            filtered.n_samples(),
            levels.len(),
            design_factor,
            filtered.n_genes(),
            excluded_genes.len(),
            params.min_total_count
        );

        Ok(Self {
            counts: filtered,
            design_factor: design_factor.to_string(),
            sample_levels,
            levels,
            excluded_genes,
        })
    }

    /// Pre-filtered counts
    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn design_factor(&self) -> &str {
        &self.design_factor
    }

    /// Level of the design factor for each sample, in count-column order
    pub fn sample_levels(&self) -> &[String] {
        &self.sample_levels
    }

    /// Levels of the design factor, reference first
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn reference_level(&self) -> &str {
        &self.levels[0]
    }

    /// Genes removed by the pre-filter
    pub fn excluded_genes(&self) -> &[String] {
        &self.excluded_genes
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }
}

fn check_sample_sets(counts: &CountMatrix, metadata: &SampleMetadata) -> Result<()> {
    let mut meta_ids = HashSet::with_capacity(metadata.n_samples());
    for id in metadata.sample_ids() {
        if !meta_ids.insert(id.as_str()) {
            return Err(DiffExprError::Schema {
                reason: format!("duplicate sample identifier '{}' in metadata", id),
            });
        }
    }

    let count_ids: HashSet<&str> = counts.sample_ids().iter().map(|s| s.as_str()).collect();
    if count_ids != meta_ids {
        let mut only_counts: Vec<&str> = count_ids.difference(&meta_ids).copied().collect();
        let mut only_meta: Vec<&str> = meta_ids.difference(&count_ids).copied().collect();
        only_counts.sort_unstable();
        only_meta.sort_unstable();
        return Err(DiffExprError::Schema {
            reason: format!(
                "sample sets differ: only in counts {:?}, only in metadata {:?}",
                only_counts, only_meta
            ),
        });
    }
    Ok(())
}
