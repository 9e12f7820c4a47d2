// dataset.rs: The base-dataset collaborator.
//
// The base dataset holds the last committed records per (subject, day). It
// is read on every overlay read and when a key is first staged, written only
// by post-commit reconciliation, and reloaded from its system of record
// after a failed commit. The staging store never reads it directly.
//
// Two implementations ship here: MemoryDataset (tests, embedding) and
// JsonFileDataset (one JSON file, used by the CLI).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use dg_changeset::Record;

use crate::error::DatasetError;

/// Committed records: subject id -> day key -> records.
pub type DayMap = BTreeMap<String, BTreeMap<String, Vec<Record>>>;

/// Source of committed day records.
///
/// Implementations use interior mutability so one dataset can be shared
/// (behind an `Arc`) between the overlay reader, the commit orchestrator,
/// and whatever else loads it.
pub trait BaseDataset: Send + Sync {
    /// Committed records for a key; empty when the key is unknown.
    fn read(&self, subject_id: &str, day_key: &str) -> Vec<Record>;

    /// Every committed day of one subject; empty when the subject is unknown.
    fn read_subject(&self, subject_id: &str) -> BTreeMap<String, Vec<Record>>;

    /// Replace the records of the given days for one subject. An empty
    /// list clears the day.
    fn write(
        &self,
        subject_id: &str,
        days: &BTreeMap<String, Vec<Record>>,
    ) -> Result<(), DatasetError>;

    /// Refresh from the system of record, discarding the local cache.
    fn reload(&self) -> Result<(), DatasetError>;
}

/// Apply a subject's day replacements to a day map.
fn merge_days(map: &mut DayMap, subject_id: &str, days: &BTreeMap<String, Vec<Record>>) {
    let subject = map.entry(subject_id.to_string()).or_default();
    for (day_key, records) in days {
        if records.is_empty() {
            subject.remove(day_key);
        } else {
            subject.insert(day_key.clone(), records.clone());
        }
    }
    if subject.is_empty() {
        map.remove(subject_id);
    }
}

fn lookup(map: &DayMap, subject_id: &str, day_key: &str) -> Vec<Record> {
    map.get(subject_id)
        .and_then(|days| days.get(day_key))
        .cloned()
        .unwrap_or_default()
}

fn lookup_subject(map: &DayMap, subject_id: &str) -> BTreeMap<String, Vec<Record>> {
    map.get(subject_id).cloned().unwrap_or_default()
}

// ── In-memory dataset ─────────────────────────────────────────────

/// In-memory dataset with a separate system-of-record copy.
///
/// `write` goes to both the cache and the system of record; `reload`
/// copies the system of record back over the cache. Writes can be made to
/// fail on demand, for exercising reconciliation failures.
#[derive(Debug, Default)]
pub struct MemoryDataset {
    cache: RwLock<DayMap>,
    source: RwLock<DayMap>,
    fail_writes: AtomicBool,
    reloads: AtomicUsize,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dataset whose cache and system of record both hold `days`.
    pub fn from_days(days: DayMap) -> Self {
        Self {
            cache: RwLock::new(days.clone()),
            source: RwLock::new(days),
            ..Self::default()
        }
    }

    /// Seed one day in both the cache and the system of record.
    pub fn insert(&self, subject_id: &str, day_key: &str, records: Vec<Record>) {
        let days = BTreeMap::from([(day_key.to_string(), records)]);
        merge_days(&mut self.source_mut(), subject_id, &days);
        merge_days(&mut self.cache_mut(), subject_id, &days);
    }

    /// Change only the system of record, leaving the cache stale until the
    /// next reload.
    pub fn insert_upstream(&self, subject_id: &str, day_key: &str, records: Vec<Record>) {
        let days = BTreeMap::from([(day_key.to_string(), records)]);
        merge_days(&mut self.source_mut(), subject_id, &days);
    }

    /// Make every subsequent `write` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times `reload` has run.
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Clone of the cached day map.
    pub fn snapshot(&self) -> DayMap {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cache_mut(&self) -> std::sync::RwLockWriteGuard<'_, DayMap> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn source_mut(&self) -> std::sync::RwLockWriteGuard<'_, DayMap> {
        self.source.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BaseDataset for MemoryDataset {
    fn read(&self, subject_id: &str, day_key: &str) -> Vec<Record> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&cache, subject_id, day_key)
    }

    fn read_subject(&self, subject_id: &str) -> BTreeMap<String, Vec<Record>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        lookup_subject(&cache, subject_id)
    }

    fn write(
        &self,
        subject_id: &str,
        days: &BTreeMap<String, Vec<Record>>,
    ) -> Result<(), DatasetError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatasetError::WriteRejected(format!(
                "writes disabled for subject '{}'",
                subject_id
            )));
        }
        merge_days(&mut self.source_mut(), subject_id, days);
        merge_days(&mut self.cache_mut(), subject_id, days);
        Ok(())
    }

    fn reload(&self) -> Result<(), DatasetError> {
        let source = self
            .source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        *self.cache_mut() = source;
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── JSON file dataset ─────────────────────────────────────────────

/// Dataset backed by one pretty-printed JSON file:
/// `{ "<subjectId>": { "<dayKey>": [records...] } }`.
///
/// Reads are served from an in-memory cache loaded at open/reload time.
/// Writes rewrite the whole file, then update the cache. A missing file
/// loads as an empty dataset.
#[derive(Debug)]
pub struct JsonFileDataset {
    path: PathBuf,
    cache: RwLock<DayMap>,
}

impl JsonFileDataset {
    /// Open the dataset at `path`, loading it if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let days = Self::load_file(&path)?;
        Ok(Self {
            path,
            cache: RwLock::new(days),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the cached day map.
    pub fn snapshot(&self) -> DayMap {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load_file(path: &Path) -> Result<DayMap, DatasetError> {
        if !path.exists() {
            return Ok(DayMap::new());
        }
        let json = fs::read_to_string(path).map_err(|source| DatasetError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        if json.trim().is_empty() {
            return Ok(DayMap::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn persist(&self, days: &DayMap) -> Result<(), DatasetError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DatasetError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(days)?;
        fs::write(&self.path, json).map_err(|source| DatasetError::IoError {
            path: self.path.clone(),
            source,
        })
    }
}

impl BaseDataset for JsonFileDataset {
    fn read(&self, subject_id: &str, day_key: &str) -> Vec<Record> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&cache, subject_id, day_key)
    }

    fn read_subject(&self, subject_id: &str) -> BTreeMap<String, Vec<Record>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        lookup_subject(&cache, subject_id)
    }

    fn write(
        &self,
        subject_id: &str,
        days: &BTreeMap<String, Vec<Record>>,
    ) -> Result<(), DatasetError> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = cache.clone();
        merge_days(&mut next, subject_id, days);
        self.persist(&next)?;
        *cache = next;
        Ok(())
    }

    fn reload(&self) -> Result<(), DatasetError> {
        let days = Self::load_file(&self.path)?;
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = days;
        tracing::debug!("dataset: reloaded {}", self.path.display());
        Ok(())
    }
}
