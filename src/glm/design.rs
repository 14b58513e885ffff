//! Design matrix creation for GLM

use ndarray::Array2;

use crate::data::ValidatedDataset;

/// Information about the design matrix
#[derive(Debug, Clone, PartialEq)]
pub struct DesignInfo {
    /// Names of the coefficients, intercept first
    pub coef_names: Vec<String>,
    pub factor: String,
    pub reference_level: String,
    /// All levels of the design factor, reference first
    pub levels: Vec<String>,
}

impl DesignInfo {
    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }

    /// Coefficient vector selecting a level's effect relative to the
    /// reference. All zeros for the reference level, `None` for unknown levels.
    pub fn level_effect(&self, level: &str) -> Option<Vec<f64>> {
        let idx = self.levels.iter().position(|l| l == level)?;
        let mut e = vec![0.0; self.n_coefs()];
        if idx > 0 {
            e[idx] = 1.0;
        }
        Some(e)
    }
}

/// Design matrix with its description
#[derive(Debug, Clone)]
pub struct ModelDesign {
    pub matrix: Array2<f64>,
    pub info: DesignInfo,
}

impl ModelDesign {
    /// Treatment-coded design: an intercept plus one indicator column per
    /// non-reference level of the design factor.
    pub fn from_dataset(dataset: &ValidatedDataset) -> Self {
        create_design_matrix(dataset.sample_levels(), dataset.design_factor(), dataset.levels())
    }

    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Build the design for per-sample levels; `levels[0]` is the reference.
pub fn create_design_matrix(sample_levels: &[String], factor: &str, levels: &[String]) -> ModelDesign {
    let n_samples = sample_levels.len();
    let n_coefs = levels.len();
    let mut matrix = Array2::zeros((n_samples, n_coefs));

    for (i, value) in sample_levels.iter().enumerate() {
        matrix[[i, 0]] = 1.0;
        for (j, level) in levels.iter().enumerate().skip(1) {
            if value == level {
                matrix[[i, j]] = 1.0;
            }
        }
    }

    let reference_level = levels[0].clone();
    let mut coef_names = vec!["Intercept".to_string()];
    for level in levels.iter().skip(1) {
        coef_names.push(format!("{}_{}_vs_{}", factor, level, reference_level));
    }

    ModelDesign {
        matrix,
        info: DesignInfo {
            coef_names,
            factor: factor.to_string(),
            reference_level,
            levels: levels.to_vec(),
        },
    }
}
