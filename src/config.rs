//! Run configuration
//!
//! Every field has a default, so a JSON config only needs the values it
//! changes: `{"testing": {"alpha": 0.1}}` is a complete configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::ValidationParams;
use crate::dispersion::DispersionParams;
use crate::error::Result;
use crate::glm::GlmFitParams;
use crate::normalization::SizeFactorParams;
use crate::testing::TestingParams;

/// Parameters for every stage of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub validation: ValidationParams,
    pub size_factors: SizeFactorParams,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
    pub testing: TestingParams,
    /// Worker threads; the global rayon pool when unset
    pub threads: Option<usize>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = PipelineConfig::from_json_str(r#"{"testing": {"alpha": 0.1}, "threads": 2}"#).unwrap();
        assert_eq!(config.testing.alpha, 0.1);
        assert_eq!(config.testing.lfc_threshold, 0.5);
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.dispersion, DispersionParams::default());
        assert_eq!(config.validation.min_total_count, 10.0);
    }

    #[test]
    fn test_config_file_round_trip() {
        let mut config = PipelineConfig::default();
        config.validation.reference_level = Some("untreated".to_string());
        config.testing.independent_filtering = false;

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", config.to_json_string().unwrap()).unwrap();

        let loaded = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(PipelineConfig::from_json_str("{not json").is_err());
    }
}
