//! Contrasts between two levels of the design factor

use serde::{Deserialize, Serialize};

use crate::data::ValidatedDataset;
use crate::error::{DiffExprError, Result};
use crate::glm::DesignInfo;

/// Comparison of `numerator` against `denominator` within `factor`.
///
/// Positive log2 fold changes mean higher expression in the numerator level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contrast {
    pub factor: String,
    pub numerator: String,
    pub denominator: String,
}

impl Contrast {
    pub fn new(factor: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            factor: factor.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }

    /// The same comparison with numerator and denominator swapped
    pub fn reversed(&self) -> Self {
        Self::new(&self.factor, &self.denominator, &self.numerator)
    }

    /// Check the contrast against the dataset's design factor and its levels.
    pub fn validate(&self, dataset: &ValidatedDataset) -> Result<()> {
        if self.factor != dataset.design_factor() {
            return Err(DiffExprError::InvalidContrast {
                reason: format!(
                    "contrast factor '{}' is not the design factor '{}'",
                    self.factor,
                    dataset.design_factor()
                ),
            });
        }

        for level in [&self.numerator, &self.denominator] {
            if !dataset.levels().contains(level) {
                return Err(DiffExprError::InvalidContrast {
                    reason: format!(
                        "level '{}' not found in '{}' (levels: {:?})",
                        level,
                        self.factor,
                        dataset.levels()
                    ),
                });
            }
        }

        if self.numerator == self.denominator {
            return Err(DiffExprError::InvalidContrast {
                reason: format!("numerator and denominator are both '{}'", self.numerator),
            });
        }
        Ok(())
    }

    /// Coefficient weights c with c'beta = effect(numerator) - effect(denominator)
    pub fn vector(&self, info: &DesignInfo) -> Result<Vec<f64>> {
        let lookup = |level: &str| {
            info.level_effect(level).ok_or_else(|| DiffExprError::InvalidContrast {
                reason: format!("level '{}' has no coefficient in the design", level),
            })
        };
        let num = lookup(&self.numerator)?;
        let den = lookup(&self.denominator)?;
        Ok(num.iter().zip(den.iter()).map(|(a, b)| a - b).collect())
    }
}

impl std::fmt::Display for Contrast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} vs {}", self.factor, self.numerator, self.denominator)
    }
}
