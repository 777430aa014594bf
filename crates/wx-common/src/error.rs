//! Error types for pipeline services.

use thiserror::Error;

/// Result type alias using WxError.
pub type WxResult<T> = Result<T, WxError>;

/// Primary error type for storage-facing pipeline operations.
#[derive(Debug, Error)]
pub enum WxError {
    // === Storage Errors ===
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    // === Data Errors ===
    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // === Infrastructure Errors ===
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WxError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, WxError::StorageError(_) | WxError::DatabaseError(_))
    }
}

// Conversion from common error types
impl From<std::io::Error> for WxError {
    fn from(err: std::io::Error) -> Self {
        WxError::DataReadError(err.to_string())
    }
}

impl From<serde_json::Error> for WxError {
    fn from(err: serde_json::Error) -> Self {
        WxError::SerializationError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(WxError::StorageError("timeout".into()).is_transient());
        assert!(WxError::DatabaseError("pool closed".into()).is_transient());
        assert!(!WxError::ConfigError("bad".into()).is_transient());
    }

    #[test]
    fn test_io_conversion_keeps_message() {
        let err: WxError = std::io::Error::new(std::io::ErrorKind::Other, "broken pipe").into();
        assert!(err.to_string().contains("broken pipe"));
    }
}
