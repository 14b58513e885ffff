//! Count matrix representation for RNA-seq data

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{DiffExprError, Result};

/// Return the first identifier that occurs more than once.
fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().find(|id| !seen.insert(id.as_str())).map(|id| id.as_str())
}

/// Read counts, genes as rows and samples as columns.
///
/// Every value is a finite non-negative integer stored as `f64`, gene and
/// sample identifiers are unique. These invariants hold for every constructed
/// value, so downstream stages never re-check them.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (genes x samples)
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a count matrix from raw data, validating every value.
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if let Some(dup) = first_duplicate(&gene_ids) {
            return Err(DiffExprError::Schema {
                reason: format!("duplicate gene identifier '{}'", dup),
            });
        }

        if let Some(dup) = first_duplicate(&sample_ids) {
            return Err(DiffExprError::Schema {
                reason: format!("duplicate sample identifier '{}'", dup),
            });
        }

        for ((gene_idx, sample_idx), &value) in counts.indexed_iter() {
            if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                return Err(DiffExprError::InvalidValue {
                    reason: format!(
                        "count {} for gene '{}' in sample '{}' is not a non-negative integer",
                        value, gene_ids[gene_idx], sample_ids[sample_idx]
                    ),
                });
            }
        }

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Create from integer counts
    pub fn from_integers(counts: Array2<u64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        Self::new(counts.mapv(|x| x as f64), gene_ids, sample_ids)
    }

    /// Create from `(gene_id, counts)` rows sharing one sample ordering.
    pub fn from_rows<I>(rows: I, sample_ids: Vec<String>) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<u64>)>,
    {
        let n_samples = sample_ids.len();
        let mut gene_ids = Vec::new();
        let mut values = Vec::new();

        for (gene_id, row) in rows {
            if row.len() != n_samples {
                return Err(DiffExprError::Schema {
                    reason: format!(
                        "gene '{}' has {} counts but there are {} samples",
                        gene_id,
                        row.len(),
                        n_samples
                    ),
                });
            }
            values.extend(row.into_iter().map(|x| x as f64));
            gene_ids.push(gene_id);
        }

        let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values).map_err(|e| {
            DiffExprError::DimensionMismatch {
                expected: format!("{} x {} counts", gene_ids.len(), n_samples),
                got: e.to_string(),
            }
        })?;

        Self::new(counts, gene_ids, sample_ids)
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get counts for a specific gene
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Sum of counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// Sum of counts per gene across all samples
    pub fn gene_totals(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(0)).map(|row| row.sum()).collect()
    }

    /// Keep genes whose total count is at least `min_total`.
    ///
    /// Returns the filtered matrix and the identifiers of the removed genes.
    /// Fails when no gene survives.
    pub fn filter_by_total(&self, min_total: f64) -> Result<(Self, Vec<String>)> {
        let totals = self.gene_totals();
        let (keep, removed): (Vec<usize>, Vec<usize>) =
            (0..self.n_genes()).partition(|&i| totals[i] >= min_total);

        if keep.is_empty() {
            return Err(DiffExprError::DegenerateInput {
                reason: format!("no gene has a total count of at least {}", min_total),
            });
        }

        let removed_ids = removed.iter().map(|&i| self.gene_ids[i].clone()).collect();
        Ok((self.subset_genes(&keep), removed_ids))
    }

    /// Subset to specific genes
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Self {
        Self {
            counts: self.counts.select(Axis(0), gene_indices),
            gene_ids: gene_indices.iter().map(|&i| self.gene_ids[i].clone()).collect(),
            sample_ids: self.sample_ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.gene_index("gene2"), Some(1));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        let result = CountMatrix::new(counts, ids("gene", 2), ids("s", 2));
        assert!(matches!(result, Err(DiffExprError::InvalidValue { .. })));
    }

    #[test]
    fn test_fractional_and_nan_counts_rejected() {
        let fractional = CountMatrix::new(array![[1.5, 2.0]], ids("gene", 1), ids("s", 2));
        assert!(matches!(fractional, Err(DiffExprError::InvalidValue { .. })));

        let nan = CountMatrix::new(array![[f64::NAN, 2.0]], ids("gene", 1), ids("s", 2));
        assert!(matches!(nan, Err(DiffExprError::InvalidValue { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let genes = vec!["a".to_string(), "a".to_string()];
        let result = CountMatrix::new(array![[1.0, 2.0], [3.0, 4.0]], genes, ids("s", 2));
        assert!(matches!(result, Err(DiffExprError::Schema { .. })));

        let samples = vec!["s".to_string(), "s".to_string()];
        let result = CountMatrix::new(array![[1.0, 2.0]], ids("gene", 1), samples);
        assert!(matches!(result, Err(DiffExprError::Schema { .. })));
    }

    #[test]
    fn test_from_rows_checks_row_length() {
        let rows = vec![("g1".to_string(), vec![1, 2]), ("g2".to_string(), vec![3])];
        let result = CountMatrix::from_rows(rows, ids("s", 2));
        assert!(matches!(result, Err(DiffExprError::Schema { .. })));

        let rows = vec![("g1".to_string(), vec![1, 2]), ("g2".to_string(), vec![3, 4])];
        let matrix = CountMatrix::from_rows(rows, ids("s", 2)).unwrap();
        assert_eq!(matrix.gene_counts(1).to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_library_sizes() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).unwrap();
        assert_eq!(matrix.library_sizes(), vec![15.0, 35.0]);
        assert_eq!(matrix.gene_totals(), vec![30.0, 20.0]);
    }

    #[test]
    fn test_filter_by_total() {
        let counts = array![[10.0, 20.0], [1.0, 2.0], [5.0, 5.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 3), ids("s", 2)).unwrap();

        let (kept, removed) = matrix.filter_by_total(10.0).unwrap();
        assert_eq!(kept.gene_ids(), &["gene1".to_string(), "gene3".to_string()]);
        assert_eq!(removed, vec!["gene2".to_string()]);
        assert!(kept.gene_totals().iter().all(|&t| t >= 10.0));

        let all_removed = matrix.filter_by_total(1000.0);
        assert!(matches!(all_removed, Err(DiffExprError::DegenerateInput { .. })));
    }
}
