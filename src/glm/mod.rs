//! Generalized Linear Model fitting for negative binomial data

mod design;
mod fitting;
pub(crate) mod linalg;
mod negative_binomial;

pub use design::{create_design_matrix, DesignInfo, ModelDesign};
pub use fitting::{fit_glm, fit_single_gene, GeneFit, GeneGlm, GlmFitParams, GlmFits};
pub use negative_binomial::{nb_deviance, nb_log_likelihood, nb_mean, nb_variance, nb_weight, MAX_BETA, MAX_ETA, MIN_MU};
