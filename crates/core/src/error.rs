//! Centralized error types for the Tally workspace.

use std::time::Duration;
use thiserror::Error;

/// Top-level error enum. Variants map to failure sources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TallyError {
    /// Transport-level failure talking to the RPC node.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Well-formed JSON-RPC error response.
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Errors scoped to a single contract lookup. The pipeline drops the
    /// affected transactions and keeps going.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            TallyError::Network(_) | TallyError::Timeout(_) | TallyError::Remote { .. }
        )
    }
}

pub type TallyResult<T> = Result<T, TallyError>;
