//! # dg-changeset
//!
//! The day-record data model for daygrid.
//!
//! A day's allocations for one subject are a list of [`Record`]s. Pending
//! edits are staged as drafts against the last committed list, classified
//! as a [`StagedOp`], and eventually shipped in a batch of
//! [`SubjectUpdate`]s.
//!
//! ## Key components
//!
//! - [`Record`]: one allocation entry (category, quantity, note).
//! - [`diff`]: canonical signatures and order/identity-independent
//!   equality between two day collections.
//! - [`StagedOp`]: the closed classification of a staged change.
//! - [`SubjectUpdate`]: the batch payload wire shape.

pub mod diff;
pub mod error;
pub mod hasher;
pub mod op;
pub mod payload;
pub mod record;

pub use diff::{canonicalize, classify, content_hash, equal, Signature};
pub use error::ChangeSetError;
pub use op::StagedOp;
pub use payload::{DayUpdate, PayloadRecord, SubjectUpdate};
pub use record::{flatten, is_empty_collection, Record};
