//! # dg-staging
//!
//! Pending-edit staging for daygrid.
//!
//! Edits to a subject's day are staged as drafts on top of the last
//! committed records, read back through an overlay, and committed together
//! as one batch. A failed batch leaves every staged edit exactly as it was.
//!
//! ## Key components
//!
//! - [`StagingStore`]: the keyed map of staged entries plus insertion order.
//! - [`OverlayReader`]: merged reads (draft if staged, base otherwise).
//! - [`StagingSession`]: the caller-facing handle tying a store to a
//!   [`BaseDataset`], including [`StagingSession::confirm_all`].
//! - [`MemoryDataset`] / [`JsonFileDataset`]: base dataset implementations.
//! - [`StagingConfig`]: `daygrid.toml` settings.

pub mod commit;
pub mod config;
pub mod dataset;
pub mod error;
pub mod overlay;
pub mod session;
pub mod store;

pub use commit::{build_batch_payload, CommitReport};
pub use config::{CommitConfig, DatasetConfig, LoggingConfig, SessionConfig, StagingConfig};
pub use dataset::{BaseDataset, DayMap, JsonFileDataset, MemoryDataset};
pub use error::{CommitError, DatasetError, StagingError};
pub use overlay::{OverlayReader, StagedMetaMap};
pub use session::StagingSession;
pub use store::{
    EntryHashes, ResetOutcome, StagingEntry, StagingKey, StagingState, StagingStore, UpsertOutcome,
};
