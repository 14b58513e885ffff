//! Sample metadata: categorical factors per sample

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DiffExprError, Result};

/// Sample metadata holding categorical factors.
///
/// Factor values are stored per sample in the order of `sample_ids`; a value
/// may be missing. Nothing is validated against a count matrix here, that
/// happens when a [`ValidatedDataset`](crate::data::ValidatedDataset) is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    /// Factor name -> value for each sample
    factors: BTreeMap<String, Vec<Option<String>>>,
}

impl SampleMetadata {
    pub fn new(sample_ids: Vec<String>) -> Self {
        Self {
            sample_ids,
            factors: BTreeMap::new(),
        }
    }

    /// Add a fully observed factor column.
    pub fn add_factor(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.add_factor_with_missing(name, values.into_iter().map(Some).collect())
    }

    /// Add a factor column where some samples may have no value.
    pub fn add_factor_with_missing(&mut self, name: &str, values: Vec<Option<String>>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.factors.insert(name.to_string(), values);
        Ok(())
    }

    pub fn has_factor(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }

    /// Values of a factor, aligned with [`sample_ids`](Self::sample_ids).
    pub fn factor(&self, name: &str) -> Option<&[Option<String>]> {
        self.factors.get(name).map(|v| v.as_slice())
    }

    pub fn factor_names(&self) -> Vec<&str> {
        self.factors.keys().map(|s| s.as_str()).collect()
    }

    /// Value of a factor for one sample
    pub fn value(&self, factor: &str, sample_id: &str) -> Option<&str> {
        let idx = self.sample_ids.iter().position(|id| id == sample_id)?;
        self.factors.get(factor)?.get(idx)?.as_deref()
    }

    /// Distinct observed levels of a factor, sorted.
    pub fn levels(&self, factor: &str) -> Option<Vec<String>> {
        self.factors.get(factor).map(|values| {
            values
                .iter()
                .flatten()
                .cloned()
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect()
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> SampleMetadata {
        let mut meta = SampleMetadata::new(vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()]);
        meta.add_factor(
            "treatment",
            vec!["treated".into(), "control".into(), "treated".into(), "control".into()],
        )
        .unwrap();
        meta
    }

    #[test]
    fn test_levels_sorted_and_unique() {
        let meta = metadata();
        assert_eq!(meta.levels("treatment").unwrap(), vec!["control", "treated"]);
        assert!(meta.levels("batch").is_none());
        assert_eq!(meta.value("treatment", "s3"), Some("treated"));
    }

    #[test]
    fn test_missing_values_are_not_levels() {
        let mut meta = metadata();
        meta.add_factor_with_missing("batch", vec![Some("b1".into()), None, Some("b2".into()), None])
            .unwrap();
        assert_eq!(meta.levels("batch").unwrap(), vec!["b1", "b2"]);
        assert_eq!(meta.value("batch", "s2"), None);
        assert!(meta.has_factor("batch"));
        assert_eq!(meta.factor_names(), vec!["batch", "treatment"]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let mut meta = metadata();
        let result = meta.add_factor("batch", vec!["b1".into()]);
        assert!(matches!(result, Err(DiffExprError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_json_round_trip_keeps_missing() {
        let mut meta = metadata();
        meta.add_factor_with_missing("batch", vec![Some("b1".into()), None, None, None])
            .unwrap();
        let json = serde_json::to_string(&meta).unwrap();
        let back: SampleMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
