// session.rs: The caller-facing staging session.
//
// A StagingSession owns one StagingStore and shares one base dataset. It
// is an explicit handle: the call site creates it and passes it (by
// reference or Arc) to whatever needs to stage or read. Every method takes
// &self; the store sits behind a mutex that is never held across an await.
//
// Edits go through stage_draft/discard_entry/reset_entry/rollback_entry,
// reads through the overlay (get_merged_day is the one read path while
// edits may be pending), and commits through confirm_all (commit.rs).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dg_changeset::{Record, StagedOp};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::dataset::BaseDataset;
use crate::error::StagingError;
use crate::overlay::{OverlayReader, StagedMetaMap};
use crate::store::{ResetOutcome, StagingEntry, StagingKey, StagingState, StagingStore, UpsertOutcome};

/// A staging store bound to its base dataset.
pub struct StagingSession<D: BaseDataset> {
    store: Mutex<StagingStore>,
    dataset: Arc<D>,
    config: SessionConfig,
    pub(crate) commit_in_flight: AtomicBool,
}

impl<D: BaseDataset> StagingSession<D> {
    /// Create a session with default settings.
    pub fn new(dataset: Arc<D>) -> Self {
        Self::with_config(dataset, SessionConfig::default())
    }

    pub fn with_config(dataset: Arc<D>, config: SessionConfig) -> Self {
        Self {
            store: Mutex::new(StagingStore::new()),
            dataset,
            config,
            commit_in_flight: AtomicBool::new(false),
        }
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Edits ─────────────────────────────────────────────────────

    /// Stage a draft for a key. `None` stages the whole day for deletion.
    ///
    /// The base is read from the dataset and only used if the key is not
    /// already staged. Records without an id get one when
    /// `assign_record_ids` is on.
    pub fn stage_draft(
        &self,
        subject_id: &str,
        day_key: &str,
        draft: Option<Vec<Record>>,
    ) -> Result<UpsertOutcome, StagingError> {
        self.check_edit(subject_id, day_key)?;

        let draft = match draft {
            Some(mut records) if self.config.assign_record_ids => {
                assign_missing_ids(&mut records);
                Some(records)
            }
            other => other,
        };

        let base = self.dataset.read(subject_id, day_key);
        tracing::debug!(
            "session: stage_draft {}|{} base_len={} draft_len={}",
            subject_id,
            day_key,
            base.len(),
            draft.as_ref().map_or(0, Vec::len)
        );
        Ok(self.lock_store().upsert(subject_id, day_key, &base, draft))
    }

    /// Drop a staged entry; reads fall back to the base.
    pub fn discard_entry(&self, subject_id: &str, day_key: &str) -> Result<bool, StagingError> {
        self.check_edit(subject_id, day_key)?;
        Ok(self.lock_store().discard(subject_id, day_key))
    }

    /// Revert a staged entry's draft to its base.
    pub fn reset_entry(&self, subject_id: &str, day_key: &str) -> Result<ResetOutcome, StagingError> {
        self.check_edit(subject_id, day_key)?;
        Ok(self.lock_store().reset(subject_id, day_key))
    }

    /// Remove a staged entry whose draft already matches its base.
    pub fn rollback_entry(&self, subject_id: &str, day_key: &str) -> Result<bool, StagingError> {
        self.check_edit(subject_id, day_key)?;
        Ok(self.lock_store().rollback(subject_id, day_key))
    }

    /// Throw away every staged entry. Returns how many were staged.
    pub fn discard_all(&self) -> Result<usize, StagingError> {
        self.check_not_committing()?;
        Ok(self.lock_store().discard_all())
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub fn get_base_day(&self, subject_id: &str, day_key: &str) -> Vec<Record> {
        self.dataset.read(subject_id, day_key)
    }

    pub fn get_merged_day(&self, subject_id: &str, day_key: &str) -> Vec<Record> {
        let store = self.lock_store();
        OverlayReader::new(store.state(), self.dataset.as_ref()).get_merged_day(subject_id, day_key)
    }

    /// Every merged day of one subject.
    pub fn get_merged_subject(&self, subject_id: &str) -> BTreeMap<String, Vec<Record>> {
        let store = self.lock_store();
        OverlayReader::new(store.state(), self.dataset.as_ref()).get_merged_subject(subject_id)
    }

    pub fn get_staged_entry(&self, subject_id: &str, day_key: &str) -> Option<StagingEntry> {
        self.lock_store().entry(subject_id, day_key).cloned()
    }

    pub fn build_staged_meta_map(&self) -> StagedMetaMap {
        let store = self.lock_store();
        OverlayReader::new(store.state(), self.dataset.as_ref()).build_staged_meta_map()
    }

    pub fn visible_status_map<S: AsRef<str>>(
        &self,
        subject_id: Option<&str>,
        visible_days: &[S],
    ) -> BTreeMap<String, StagedOp> {
        let store = self.lock_store();
        OverlayReader::new(store.state(), self.dataset.as_ref())
            .visible_status_map(subject_id, visible_days)
    }

    // ── Introspection ─────────────────────────────────────────────

    /// Copy of the current entries and order.
    pub fn snapshot(&self) -> StagingState {
        self.lock_store().snapshot()
    }

    /// Number of staged keys, noop entries included.
    pub fn staged_count(&self) -> usize {
        self.lock_store().len()
    }

    pub fn is_commit_in_flight(&self) -> bool {
        self.commit_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn lock_store(&self) -> MutexGuard<'_, StagingStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_edit(&self, subject_id: &str, day_key: &str) -> Result<(), StagingError> {
        if !StagingKey::new(subject_id, day_key).is_valid() {
            return Err(StagingError::InvalidKey {
                subject_id: subject_id.to_string(),
                day_key: day_key.to_string(),
            });
        }
        self.check_not_committing()
    }

    fn check_not_committing(&self) -> Result<(), StagingError> {
        if self.config.reject_edits_during_commit && self.is_commit_in_flight() {
            return Err(StagingError::CommitInFlight);
        }
        Ok(())
    }
}

fn assign_missing_ids(records: &mut [Record]) {
    for record in records
        .iter_mut()
        .filter(|r| r.id.as_deref().map_or(true, str::is_empty))
    {
        record.id = Some(Uuid::new_v4().to_string());
    }
}
