//! Independent filtering of low-count genes before multiple-testing correction

mod independent;

pub use independent::{independent_filtering, FilterOutcome};
