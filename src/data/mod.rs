//! Input data: counts, sample metadata and the validation gate

mod count_matrix;
mod dataset;
mod metadata;

pub use count_matrix::CountMatrix;
pub use dataset::{ValidatedDataset, ValidationParams};
pub use metadata::SampleMetadata;
