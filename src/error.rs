//! Error types for diffexpr

use thiserror::Error;

/// Main error type for differential expression runs.
///
/// Every variant is fatal for the run that raised it. Problems confined to a
/// single gene (non-convergence, fit failure) are reported as per-gene flags
/// instead.
#[derive(Error, Debug)]
pub enum DiffExprError {
    #[error("Schema error: {reason}")]
    Schema { reason: String },

    #[error("Invalid count value: {reason}")]
    InvalidValue { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Design error: {reason}")]
    Design { reason: String },

    #[error("Invalid contrast specification: {reason}")]
    InvalidContrast { reason: String },

    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("Request to {url} failed with HTTP status {status}")]
    Request { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl DiffExprError {
    /// True for failures of an external collaborator request.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            DiffExprError::Request { .. } | DiffExprError::Http(_) | DiffExprError::MalformedResponse { .. }
        )
    }
}

/// Result type alias for diffexpr operations
pub type Result<T> = std::result::Result<T, DiffExprError>;
