//! Error types for the ingestion crate.

use thiserror::Error;
use wx_common::WxError;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Storage error: {0}")]
    Storage(#[from] WxError),

    #[error("Failed to read line stream for {source_key}: {message}")]
    Stream { source_key: String, message: String },

    #[error("No station configured for per-line file {0}")]
    MissingStation(String),

    #[error("id_station is missing in record and cannot be inferred for file {0}")]
    MissingStationId(String),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
