// error.rs: Error types for the staging subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a base-dataset collaborator.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The dataset file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The dataset refused a write.
    #[error("dataset write rejected: {0}")]
    WriteRejected(String),
}

/// Errors from the caller-facing staging session.
///
/// The staging store itself never fails; these come from the session's
/// preconditions and its collaborators.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Subject id or day key was empty.
    #[error("invalid staging key: subject '{subject_id}', day '{day_key}'")]
    InvalidKey { subject_id: String, day_key: String },

    /// An edit arrived while a batch commit was still pending.
    #[error("a batch commit is in flight; edits are rejected until it settles")]
    CommitInFlight,

    /// The base dataset failed.
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

/// Failure of [`StagingSession::confirm_all`](crate::StagingSession::confirm_all).
///
/// `Rejected` carries the persistence function's own error unchanged, after
/// the staging state has been restored.
#[derive(Debug, Error)]
pub enum CommitError<E>
where
    E: std::error::Error + 'static,
{
    /// Another commit on the same session has not settled yet.
    #[error("a batch commit is already in flight")]
    InFlight,

    /// The persistence function rejected the batch.
    #[error("batch commit rejected: {0}")]
    Rejected(#[source] E),
}

impl<E> CommitError<E>
where
    E: std::error::Error + 'static,
{
    /// The persistence function's error, if that is what failed.
    pub fn into_rejection(self) -> Option<E> {
        match self {
            Self::Rejected(e) => Some(e),
            Self::InFlight => None,
        }
    }
}
