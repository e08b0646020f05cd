//! Error types for the ETL run

use thiserror::Error;

/// Result type alias for pipeline stages
pub type Result<T> = std::result::Result<T, EtlError>;

/// Failure of one pipeline stage.
///
/// `RetentionFailed` is the only variant the pipeline swallows; every other
/// variant aborts the run.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Source not found: {origin}: {reason}")]
    SourceNotFound { origin: String, reason: String },

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Publish failed for {key}: {reason}")]
    PublishFailed { key: String, reason: String },

    #[error("Retention sweep failed: {0}")]
    RetentionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Whether this failure ends the run.
    pub fn is_abort(&self) -> bool {
        !matches!(self, EtlError::RetentionFailed(_))
    }
}

impl From<csv::Error> for EtlError {
    fn from(err: csv::Error) -> Self {
        EtlError::ConversionFailed(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for EtlError {
    fn from(err: arrow::error::ArrowError) -> Self {
        EtlError::ConversionFailed(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for EtlError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        EtlError::ConversionFailed(err.to_string())
    }
}
