// commit.rs: Batch payload construction and the atomic confirm-all flow.
//
// confirm_all turns every non-noop staged entry into one batch, hands the
// batch to a caller-supplied persistence function, and then either:
//   - success: writes the committed days back to the base dataset and
//     clears the store, or
//   - failure: restores the pre-commit staging state exactly, optionally
//     reloads the base dataset, and returns the persistence error.
//
// The store lock is never held across the persistence await, and nothing
// in the store changes until the await resolves, so a dropped commit
// future leaves the staging state as it was.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dg_changeset::{DayUpdate, Record, StagedOp, SubjectUpdate};
use serde::Serialize;

use crate::dataset::BaseDataset;
use crate::error::CommitError;
use crate::session::StagingSession;
use crate::store::StagingState;

/// Build the batch for a staging state.
///
/// Noop entries are skipped. Subjects appear in the order their first entry
/// was staged, and each subject's days follow staging order. A whole-day
/// deletion becomes an update with no records.
pub fn build_batch_payload(state: &StagingState) -> Vec<SubjectUpdate> {
    let mut batch: Vec<SubjectUpdate> = Vec::new();
    for entry in state.iter_ordered().filter(|e| !e.op.is_noop()) {
        let update = DayUpdate::new(entry.day_key.clone(), &entry.merged());
        match batch.iter_mut().find(|s| s.subject_id == entry.subject_id) {
            Some(subject) => subject.updates.push(update),
            None => batch.push(SubjectUpdate {
                subject_id: entry.subject_id.clone(),
                updates: vec![update],
            }),
        }
    }
    batch
}

/// Outcome of a successful batch commit.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub committed_at: DateTime<Utc>,
    /// Subjects in the batch.
    pub subjects: usize,
    /// Day updates in the batch.
    pub days: usize,
    /// Days that went from no records to some.
    pub inserted: usize,
    pub updated: usize,
    /// Days cleared, whole-day deletions included.
    pub deleted: usize,
    /// Subjects whose base-dataset write failed after the commit succeeded.
    pub reconciliation_failures: usize,
}

/// Per-op counts of the entries a batch was built from, as
/// (inserted, updated, deleted). Noop entries are not counted.
fn count_ops(state: &StagingState) -> (usize, usize, usize) {
    state
        .iter_ordered()
        .fold((0, 0, 0), |(ins, upd, del), entry| match entry.op {
            StagedOp::Create => (ins + 1, upd, del),
            StagedOp::Update => (ins, upd + 1, del),
            StagedOp::Delete => (ins, upd, del + 1),
            StagedOp::Noop => (ins, upd, del),
        })
}

/// Holds the session's in-flight flag for the life of one commit.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<D: BaseDataset> StagingSession<D> {
    /// Batch payload for everything currently staged.
    pub fn build_batch_payload(&self) -> Vec<SubjectUpdate> {
        build_batch_payload(self.lock_store().state())
    }

    /// Commit every staged change as one batch.
    ///
    /// Returns `Ok(None)` without calling `apply` when nothing is staged.
    /// On success the base dataset is reconciled (write failures are logged
    /// and counted, not returned) and the store is cleared. On failure the
    /// staging state is restored exactly and `apply`'s error is returned
    /// inside [`CommitError::Rejected`]. A second call while one is pending
    /// gets [`CommitError::InFlight`].
    pub async fn confirm_all<F, Fut, E>(
        &self,
        apply: F,
    ) -> Result<Option<CommitReport>, CommitError<E>>
    where
        F: FnOnce(Vec<SubjectUpdate>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::error::Error + 'static,
    {
        let Some(_guard) = InFlightGuard::acquire(&self.commit_in_flight) else {
            tracing::warn!("commit: confirm_all called while another commit is pending");
            return Err(CommitError::InFlight);
        };

        let (snapshot, payload) = {
            let store = self.lock_store();
            if store.is_empty() {
                tracing::debug!("commit: nothing staged");
                return Ok(None);
            }
            let snapshot = store.snapshot();
            let payload = build_batch_payload(store.state());
            (snapshot, payload)
        };

        let subjects = payload.len();
        let days = SubjectUpdate::day_count(&payload);
        let (inserted, updated, deleted) = count_ops(&snapshot);
        tracing::info!(
            "commit: applying batch ({} subjects, {} day updates, {} staged entries)",
            subjects,
            days,
            snapshot.len()
        );

        match apply(payload.clone()).await {
            Ok(()) => {
                let reconciliation_failures = self.reconcile(&payload);
                let cleared = self.lock_store().discard_all();
                tracing::info!(
                    "commit: batch applied, cleared {} staged entries",
                    cleared
                );
                Ok(Some(CommitReport {
                    committed_at: Utc::now(),
                    subjects,
                    days,
                    inserted,
                    updated,
                    deleted,
                    reconciliation_failures,
                }))
            }
            Err(e) => {
                tracing::error!(
                    "commit: batch rejected, restoring {} staged entries: {}",
                    snapshot.len(),
                    e
                );
                self.lock_store().restore(snapshot);
                if self.config().reload_on_failure {
                    if let Err(reload_err) = self.dataset().reload() {
                        tracing::warn!("commit: base dataset reload failed: {}", reload_err);
                    }
                }
                Err(CommitError::Rejected(e))
            }
        }
    }

    /// Push committed days into the base dataset. Returns the number of
    /// subjects whose write failed.
    fn reconcile(&self, payload: &[SubjectUpdate]) -> usize {
        let mut failures = 0;
        for subject in payload {
            let days: BTreeMap<String, Vec<Record>> = subject
                .updates
                .iter()
                .map(|u| (u.day_key.clone(), u.to_records()))
                .collect();
            if let Err(e) = self.dataset().write(&subject.subject_id, &days) {
                tracing::warn!(
                    "commit: reconciling subject '{}' into base dataset failed: {}",
                    subject.subject_id,
                    e
                );
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dataset::MemoryDataset;
    use crate::store::StagingStore;

    #[derive(Debug, thiserror::Error)]
    #[error("backend unavailable")]
    struct BackendDown;

    fn rec(category: &str, quantity: f64) -> Record {
        Record::new(category, quantity)
    }

    #[test]
    fn payload_groups_by_subject_in_staging_order() {
        let mut store = StagingStore::new();
        store.upsert("E2", "d2", &[], Some(vec![rec("A", 1.0)]));
        store.upsert("E1", "d1", &[rec("A", 1.0)], None);
        store.upsert("E2", "d1", &[rec("A", 1.0)], Some(vec![rec("B", 1.0)]));

        let batch = build_batch_payload(store.state());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].subject_id, "E2");
        let e2_days: Vec<&str> = batch[0].updates.iter().map(|u| u.day_key.as_str()).collect();
        assert_eq!(e2_days, vec!["d2", "d1"]);
        assert_eq!(batch[1].subject_id, "E1");
        assert!(batch[1].updates[0].records.is_empty());
    }

    #[test]
    fn payload_skips_noop_entries() {
        let mut store = StagingStore::new();
        store.upsert("E1", "d1", &[rec("A", 1.0)], Some(vec![rec("A", 1.0)]));
        store.upsert("E1", "d2", &[], Some(vec![rec("A", 1.0)]));

        let batch = build_batch_payload(store.state());
        assert_eq!(SubjectUpdate::day_count(&batch), 1);
        assert_eq!(batch[0].updates[0].day_key, "d2");
    }

    #[tokio::test]
    async fn empty_store_does_not_call_apply() {
        let session = StagingSession::new(Arc::new(MemoryDataset::new()));
        let report = session
            .confirm_all(|_batch| async { Err::<(), _>(BackendDown) })
            .await
            .unwrap();
        assert!(report.is_none());
        assert!(!session.is_commit_in_flight());
    }

    #[tokio::test]
    async fn success_reconciles_and_clears() {
        let ds = Arc::new(MemoryDataset::new());
        ds.insert("E1", "d1", vec![rec("A", 8.0)]);
        let session = StagingSession::new(ds.clone());
        session
            .stage_draft("E1", "d1", Some(vec![rec("B", 4.0)]))
            .unwrap();

        let report = session
            .confirm_all(|_batch| async { Ok::<(), BackendDown>(()) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.subjects, 1);
        assert_eq!(report.days, 1);
        assert_eq!(report.reconciliation_failures, 0);
        assert_eq!(session.staged_count(), 0);
        assert_eq!(ds.read("E1", "d1"), vec![rec("B", 4.0)]);
        assert!(!session.is_commit_in_flight());
    }

    #[tokio::test]
    async fn failure_restores_state_and_reloads() {
        let ds = Arc::new(MemoryDataset::new());
        let session = StagingSession::new(ds.clone());
        session.stage_draft("E1", "d1", Some(vec![rec("A", 1.0)])).unwrap();
        let before = session.snapshot();

        let err = session
            .confirm_all(|_batch| async { Err::<(), _>(BackendDown) })
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::Rejected(BackendDown)));
        assert_eq!(session.snapshot(), before);
        assert_eq!(ds.reload_count(), 1);
        assert!(!session.is_commit_in_flight());
    }

    #[tokio::test]
    async fn report_counts_ops_and_skips_noops() {
        let ds = Arc::new(MemoryDataset::new());
        ds.insert("E1", "d1", vec![rec("A", 8.0)]);
        ds.insert("E1", "d2", vec![rec("A", 8.0)]);
        ds.insert("E2", "d1", vec![rec("A", 8.0)]);
        let session = StagingSession::new(ds);
        session.stage_draft("E1", "d1", Some(vec![rec("A", 4.0)])).unwrap();
        session.stage_draft("E1", "d2", None).unwrap();
        session.stage_draft("E2", "d1", Some(vec![])).unwrap();
        session.stage_draft("E3", "d1", Some(vec![rec("B", 1.0)])).unwrap();
        session.stage_draft("E3", "d2", Some(vec![rec("B", 1.0)])).unwrap();
        session.stage_draft("E3", "d2", Some(vec![])).unwrap();

        let report = session
            .confirm_all(|_batch| async { Ok::<(), BackendDown>(()) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.days, 4);
    }
}
