// overlay.rs: Merged reads of staged drafts over committed data.
//
// The overlay is the single read path while edits may be pending: a staged
// key reads as its draft (a whole-day deletion reads as empty), anything
// else reads straight from the base dataset. The reader borrows the
// staging state and never mutates it.

use std::collections::{BTreeMap, HashSet};

use dg_changeset::{Record, StagedOp};

use crate::dataset::BaseDataset;
use crate::store::{StagingEntry, StagingState};

/// Projection of staged ops: subject id -> day key -> op. Noop entries are
/// left out.
pub type StagedMetaMap = BTreeMap<String, BTreeMap<String, StagedOp>>;

/// Read-only view combining a staging state with its base dataset.
pub struct OverlayReader<'a, D: BaseDataset + ?Sized> {
    state: &'a StagingState,
    dataset: &'a D,
}

impl<'a, D: BaseDataset + ?Sized> OverlayReader<'a, D> {
    pub fn new(state: &'a StagingState, dataset: &'a D) -> Self {
        Self { state, dataset }
    }

    /// Last committed records for a key, from the base dataset only.
    pub fn get_base_day(&self, subject_id: &str, day_key: &str) -> Vec<Record> {
        self.dataset.read(subject_id, day_key)
    }

    /// What consumers should see for a key: the staged draft if there is
    /// one, otherwise the base.
    pub fn get_merged_day(&self, subject_id: &str, day_key: &str) -> Vec<Record> {
        match self.state.entry(subject_id, day_key) {
            Some(entry) => entry.merged(),
            None => self.get_base_day(subject_id, day_key),
        }
    }

    /// A subject's whole merged day map: committed days with staged drafts
    /// laid over them. Staged days read as their draft even when the base
    /// has no such day; whole-day deletions read as an empty list.
    pub fn get_merged_subject(&self, subject_id: &str) -> BTreeMap<String, Vec<Record>> {
        let mut days = self.dataset.read_subject(subject_id);
        for entry in self
            .state
            .iter_ordered()
            .filter(|e| e.subject_id == subject_id)
        {
            days.insert(entry.day_key.clone(), entry.merged());
        }
        days
    }

    /// The raw staging entry, keeping the whole-day-deletion distinction.
    pub fn get_staged_entry(&self, subject_id: &str, day_key: &str) -> Option<&'a StagingEntry> {
        self.state.entry(subject_id, day_key)
    }

    /// Non-noop ops for every staged key, walked in first-staged order.
    pub fn build_staged_meta_map(&self) -> StagedMetaMap {
        let mut meta = StagedMetaMap::new();
        for entry in self.state.iter_ordered() {
            if entry.op.is_noop() {
                continue;
            }
            meta.entry(entry.subject_id.clone())
                .or_default()
                .insert(entry.day_key.clone(), entry.op);
        }
        meta
    }

    /// Flat `day -> op` status for the visible days only.
    ///
    /// With a subject, reports that subject's non-noop entries. Without
    /// one, aggregates every subject per day, keeping the strongest op:
    /// delete over create over update.
    pub fn visible_status_map<S: AsRef<str>>(
        &self,
        subject_id: Option<&str>,
        visible_days: &[S],
    ) -> BTreeMap<String, StagedOp> {
        let visible: HashSet<&str> = visible_days.iter().map(AsRef::as_ref).collect();
        let mut result: BTreeMap<String, StagedOp> = BTreeMap::new();
        if visible.is_empty() {
            return result;
        }

        let candidates = self
            .state
            .iter_ordered()
            .filter(|e| !e.op.is_noop())
            .filter(|e| visible.contains(e.day_key.as_str()))
            .filter(|e| subject_id.map_or(true, |s| e.subject_id == s));

        for entry in candidates {
            result
                .entry(entry.day_key.clone())
                .and_modify(|current| {
                    if precedence(entry.op) > precedence(*current) {
                        *current = entry.op;
                    }
                })
                .or_insert(entry.op);
        }
        result
    }
}

fn precedence(op: StagedOp) -> u8 {
    match op {
        StagedOp::Delete => 3,
        StagedOp::Create => 2,
        StagedOp::Update => 1,
        StagedOp::Noop => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::store::StagingStore;

    fn rec(category: &str, quantity: f64) -> Record {
        Record::new(category, quantity)
    }

    #[test]
    fn unstaged_keys_read_through_to_base() {
        let ds = MemoryDataset::new();
        ds.insert("E1", "d1", vec![rec("A", 8.0)]);
        let store = StagingStore::new();
        let overlay = OverlayReader::new(store.state(), &ds);

        assert_eq!(overlay.get_merged_day("E1", "d1"), overlay.get_base_day("E1", "d1"));
        assert!(overlay.get_merged_day("E2", "d1").is_empty());
    }

    #[test]
    fn staged_draft_shadows_base() {
        let ds = MemoryDataset::new();
        ds.insert("E1", "d1", vec![rec("A", 8.0)]);
        let mut store = StagingStore::new();
        store.upsert("E1", "d1", &ds.read("E1", "d1"), Some(vec![rec("B", 3.0)]));

        let overlay = OverlayReader::new(store.state(), &ds);
        assert_eq!(overlay.get_merged_day("E1", "d1"), vec![rec("B", 3.0)]);
        assert_eq!(overlay.get_base_day("E1", "d1"), vec![rec("A", 8.0)]);
    }

    #[test]
    fn whole_day_deletion_reads_empty_but_entry_keeps_none() {
        let ds = MemoryDataset::new();
        ds.insert("E1", "d1", vec![rec("A", 8.0)]);
        let mut store = StagingStore::new();
        store.upsert("E1", "d1", &ds.read("E1", "d1"), None);

        let overlay = OverlayReader::new(store.state(), &ds);
        assert!(overlay.get_merged_day("E1", "d1").is_empty());
        assert!(overlay.get_staged_entry("E1", "d1").unwrap().draft.is_none());
    }

    #[test]
    fn merged_subject_layers_drafts_over_base_days() {
        let ds = MemoryDataset::new();
        ds.insert("E1", "d1", vec![rec("A", 8.0)]);
        ds.insert("E1", "d2", vec![rec("B", 8.0)]);
        ds.insert("E2", "d1", vec![rec("C", 8.0)]);
        let mut store = StagingStore::new();
        store.upsert("E1", "d2", &ds.read("E1", "d2"), None);
        store.upsert("E1", "d3", &[], Some(vec![rec("D", 1.0)]));
        store.upsert("E2", "d1", &ds.read("E2", "d1"), Some(vec![rec("Z", 1.0)]));

        let overlay = OverlayReader::new(store.state(), &ds);
        let merged = overlay.get_merged_subject("E1");
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["d1"], vec![rec("A", 8.0)]);
        assert!(merged["d2"].is_empty());
        assert_eq!(merged["d3"], vec![rec("D", 1.0)]);
        for (day, records) in &merged {
            assert_eq!(records, &overlay.get_merged_day("E1", day));
        }

        assert!(overlay.get_merged_subject("E9").is_empty());
    }

    #[test]
    fn meta_map_skips_noop_entries() {
        let ds = MemoryDataset::new();
        let mut store = StagingStore::new();
        store.upsert("E1", "d1", &[], Some(vec![rec("A", 1.0)]));
        store.upsert("E1", "d2", &[rec("A", 1.0)], None);
        store.upsert("E2", "d1", &[rec("A", 1.0)], Some(vec![rec("A", 2.0)]));
        store.upsert("E2", "d1", &[], Some(vec![rec("A", 1.0)]));

        let meta = OverlayReader::new(store.state(), &ds).build_staged_meta_map();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta["E1"]["d1"], StagedOp::Create);
        assert_eq!(meta["E1"]["d2"], StagedOp::Delete);
        assert!(!meta.contains_key("E2"));
    }

    #[test]
    fn visible_status_for_one_subject() {
        let ds = MemoryDataset::new();
        let mut store = StagingStore::new();
        store.upsert("E1", "d1", &[], Some(vec![rec("A", 1.0)]));
        store.upsert("E1", "d9", &[rec("A", 1.0)], None);
        store.upsert("E2", "d1", &[rec("A", 1.0)], None);

        let overlay = OverlayReader::new(store.state(), &ds);
        let status = overlay.visible_status_map(Some("E1"), &["d1", "d2"]);
        assert_eq!(status.len(), 1);
        assert_eq!(status["d1"], StagedOp::Create);
    }

    #[test]
    fn visible_status_aggregates_with_delete_precedence() {
        let ds = MemoryDataset::new();
        let mut store = StagingStore::new();
        store.upsert("E1", "d1", &[rec("A", 1.0)], Some(vec![rec("A", 2.0)]));
        store.upsert("E2", "d1", &[], Some(vec![rec("A", 1.0)]));
        store.upsert("E3", "d1", &[rec("A", 1.0)], None);
        store.upsert("E1", "d2", &[rec("A", 1.0)], Some(vec![rec("A", 2.0)]));
        store.upsert("E2", "d2", &[], Some(vec![rec("A", 1.0)]));

        let overlay = OverlayReader::new(store.state(), &ds);
        let status = overlay.visible_status_map(None, &["d1".to_string(), "d2".to_string()]);
        assert_eq!(status["d1"], StagedOp::Delete);
        assert_eq!(status["d2"], StagedOp::Create);

        let none: [&str; 0] = [];
        assert!(overlay.visible_status_map(None, &none).is_empty());
    }
}
