// store.rs: The staging state machine.
//
// Each (subject, day) key moves through
//   absent -> staged(create|update|delete) -> staged(noop) -> absent.
// The base snapshot is captured once, when a key is first staged, and is
// kept until the entry is removed; later edits only replace the draft and
// reclassify. Every operation here is a pure, total transition: no I/O,
// no failure. Empty keys are ignored.

use std::collections::BTreeMap;
use std::fmt;

use dg_changeset::{classify, content_hash, flatten, is_empty_collection, Record, StagedOp};
use serde::{Deserialize, Serialize};

/// Composite key of a staging entry. Renders as `subjectId|dayKey`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingKey {
    pub subject_id: String,
    pub day_key: String,
}

impl StagingKey {
    pub fn new(subject_id: impl Into<String>, day_key: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            day_key: day_key.into(),
        }
    }

    /// Both parts must be non-empty.
    pub fn is_valid(&self) -> bool {
        !self.subject_id.is_empty() && !self.day_key.is_empty()
    }

    fn matches(&self, subject_id: &str, day_key: &str) -> bool {
        self.subject_id == subject_id && self.day_key == day_key
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.subject_id, self.day_key)
    }
}

/// Content hashes of an entry's base and draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHashes {
    pub base: String,
    pub draft: String,
}

/// One pending edit: the captured base, the proposed draft, and the
/// classification of the pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingEntry {
    pub subject_id: String,
    pub day_key: String,

    /// Committed records as they were when the key was first staged.
    pub base: Vec<Record>,

    /// Proposed records. `None` means the whole day is staged for deletion;
    /// `Some(vec![])` means the list was emptied. Both read back as empty.
    pub draft: Option<Vec<Record>>,

    pub op: StagedOp,

    /// The op this entry had before the latest transition. Informational.
    pub previous_op: Option<StagedOp>,

    pub hashes: EntryHashes,

    /// False when the draft matches the base, or right after a reset.
    pub dirty: bool,
}

impl StagingEntry {
    pub fn key(&self) -> StagingKey {
        StagingKey::new(self.subject_id.clone(), self.day_key.clone())
    }

    /// The draft as consumers read it (`None` flattened to empty).
    pub fn merged(&self) -> Vec<Record> {
        flatten(self.draft.as_deref())
    }

    /// Whether the draft is an explicit whole-day deletion.
    pub fn is_whole_day_deletion(&self) -> bool {
        self.draft.is_none()
    }
}

/// The full staging state: entries by subject then day, plus the keys in
/// first-staged order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingState {
    pub entries: BTreeMap<String, BTreeMap<String, StagingEntry>>,
    pub order: Vec<StagingKey>,
}

impl StagingState {
    pub fn entry(&self, subject_id: &str, day_key: &str) -> Option<&StagingEntry> {
        self.entries.get(subject_id)?.get(day_key)
    }

    /// Number of keys currently staged, noop entries included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in first-staged order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &StagingEntry> {
        self.order
            .iter()
            .filter_map(|key| self.entry(&key.subject_id, &key.day_key))
    }

    /// `order` rendered as `subjectId|dayKey` strings.
    pub fn order_keys(&self) -> Vec<String> {
        self.order.iter().map(ToString::to_string).collect()
    }
}

/// Result of [`StagingStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A key part was empty; nothing changed.
    Ignored,
    /// The key was absent and the draft equals the base; no entry created.
    Unchanged,
    /// The entry was installed or updated with this op.
    Staged(StagedOp),
}

/// Result of [`StagingStore::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// No entry for the key.
    Missing,
    /// The base was empty, so the entry was dropped.
    Removed,
    /// The draft now equals the base; the entry stays, clean.
    Reverted,
}

/// Owner of the staging state. See the module header for the lifecycle.
#[derive(Debug, Default)]
pub struct StagingStore {
    state: StagingState,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StagingState {
        &self.state
    }

    pub fn entries(&self) -> &BTreeMap<String, BTreeMap<String, StagingEntry>> {
        &self.state.entries
    }

    pub fn order(&self) -> &[StagingKey] {
        &self.state.order
    }

    pub fn entry(&self, subject_id: &str, day_key: &str) -> Option<&StagingEntry> {
        self.state.entry(subject_id, day_key)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Stage `next_draft` for a key.
    ///
    /// `base_snapshot` only seeds a new entry; an existing entry keeps the
    /// base it captured first, so ops are always computed against the
    /// original committed value. An edit that lands back on the base turns
    /// an existing entry into a clean `Noop` entry rather than removing it.
    pub fn upsert(
        &mut self,
        subject_id: &str,
        day_key: &str,
        base_snapshot: &[Record],
        next_draft: Option<Vec<Record>>,
    ) -> UpsertOutcome {
        let key = StagingKey::new(subject_id, day_key);
        if !key.is_valid() {
            tracing::debug!("staging: ignoring upsert with empty key '{}'", key);
            return UpsertOutcome::Ignored;
        }

        let existing = self.entry(subject_id, day_key);
        let base = match existing {
            Some(entry) => entry.base.clone(),
            None => base_snapshot.to_vec(),
        };

        let op = classify(Some(base.as_slice()), next_draft.as_deref());
        if op.is_noop() && existing.is_none() {
            tracing::debug!("staging: draft for {} equals base, nothing staged", key);
            return UpsertOutcome::Unchanged;
        }

        // A noop transition keeps the entry's earlier history.
        let previous_op = match existing {
            Some(entry) if op.is_noop() => entry.previous_op,
            Some(entry) => Some(entry.op),
            None => None,
        };

        let base_hash = content_hash(Some(base.as_slice()));
        let (draft_hash, dirty) = if op.is_noop() {
            (base_hash.clone(), false)
        } else {
            (content_hash(next_draft.as_deref()), true)
        };

        tracing::debug!(
            "staging: upsert {} op={} prev={:?} base_len={} draft_len={} whole_day={}",
            key,
            op,
            previous_op,
            base.len(),
            next_draft.as_ref().map_or(0, Vec::len),
            next_draft.is_none()
        );

        let entry = StagingEntry {
            subject_id: subject_id.to_string(),
            day_key: day_key.to_string(),
            base,
            draft: next_draft,
            op,
            previous_op,
            hashes: EntryHashes {
                base: base_hash,
                draft: draft_hash,
            },
            dirty,
        };
        self.install(key, entry);
        UpsertOutcome::Staged(op)
    }

    /// Remove an entry unconditionally. Returns whether one existed.
    pub fn discard(&mut self, subject_id: &str, day_key: &str) -> bool {
        let removed = self.remove(subject_id, day_key);
        if removed {
            tracing::debug!("staging: discarded {}|{}", subject_id, day_key);
        }
        removed
    }

    /// Revert an entry's draft to its base.
    ///
    /// An entry whose base is empty has nothing to revert to and is removed.
    /// Otherwise the entry stays with `op = Update` and `dirty = false`.
    pub fn reset(&mut self, subject_id: &str, day_key: &str) -> ResetOutcome {
        let Some(entry) = self
            .state
            .entries
            .get_mut(subject_id)
            .and_then(|days| days.get_mut(day_key))
        else {
            return ResetOutcome::Missing;
        };

        if is_empty_collection(Some(entry.base.as_slice())) {
            self.remove(subject_id, day_key);
            tracing::debug!("staging: reset {}|{} removed (empty base)", subject_id, day_key);
            return ResetOutcome::Removed;
        }

        entry.previous_op = Some(entry.op);
        entry.draft = Some(entry.base.clone());
        entry.op = StagedOp::Update;
        entry.hashes.draft = entry.hashes.base.clone();
        entry.dirty = false;
        tracing::debug!("staging: reset {}|{} to base", subject_id, day_key);
        ResetOutcome::Reverted
    }

    /// Remove an entry only if its current draft semantically equals its
    /// base. Returns whether the entry was removed.
    pub fn rollback(&mut self, subject_id: &str, day_key: &str) -> bool {
        let Some(entry) = self.entry(subject_id, day_key) else {
            return false;
        };
        if !dg_changeset::equal(Some(entry.base.as_slice()), entry.draft.as_deref()) {
            tracing::debug!(
                "staging: rollback {}|{} skipped, draft still differs from base",
                subject_id,
                day_key
            );
            return false;
        }
        self.remove(subject_id, day_key)
    }

    /// Clear every entry. Returns how many keys were staged.
    pub fn discard_all(&mut self) -> usize {
        let count = self.state.order.len();
        self.state = StagingState::default();
        if count > 0 {
            tracing::debug!("staging: discarded all {} entries", count);
        }
        count
    }

    /// Clone of the whole state, for rollback.
    pub fn snapshot(&self) -> StagingState {
        self.state.clone()
    }

    /// Replace the whole state with a previous snapshot.
    pub fn restore(&mut self, snapshot: StagingState) {
        self.state = snapshot;
    }

    fn install(&mut self, key: StagingKey, entry: StagingEntry) {
        self.state
            .entries
            .entry(key.subject_id.clone())
            .or_default()
            .insert(key.day_key.clone(), entry);
        if !self.state.order.contains(&key) {
            self.state.order.push(key);
        }
    }

    fn remove(&mut self, subject_id: &str, day_key: &str) -> bool {
        let Some(days) = self.state.entries.get_mut(subject_id) else {
            return false;
        };
        if days.remove(day_key).is_none() {
            return false;
        }
        if days.is_empty() {
            self.state.entries.remove(subject_id);
        }
        self.state.order.retain(|k| !k.matches(subject_id, day_key));
        true
    }
}
