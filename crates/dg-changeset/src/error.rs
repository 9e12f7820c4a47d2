// error.rs: Error types for the day-record data model.

use thiserror::Error;

/// Errors that can occur while decoding records or payloads.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or malformed data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
