//! Results tables and their export

mod csv;
mod results;

pub use self::csv::{write_results, write_results_file};
pub use results::{GeneStatus, ResultRow, ResultsSummary, ResultsTable};
