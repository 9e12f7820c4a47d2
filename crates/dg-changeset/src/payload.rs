// payload.rs: Batch commit wire shape.
//
// A batch is a list of per-subject updates; each update replaces one day's
// records wholesale. Record ids are local to the staging layer and are not
// sent.

use serde::{Deserialize, Serialize};

use crate::error::ChangeSetError;
use crate::record::Record;

/// A record as sent to the persistence function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRecord {
    pub category: String,
    pub quantity: f64,
    pub note: String,
}

impl From<&Record> for PayloadRecord {
    fn from(record: &Record) -> Self {
        Self {
            category: record.category.clone(),
            quantity: record.quantity,
            note: record.note.clone(),
        }
    }
}

impl From<&PayloadRecord> for Record {
    fn from(record: &PayloadRecord) -> Self {
        Record::new(record.category.clone(), record.quantity).with_note(record.note.clone())
    }
}

/// Replacement records for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayUpdate {
    pub day_key: String,
    pub records: Vec<PayloadRecord>,
}

impl DayUpdate {
    /// Build an update from staged records. Pass an empty slice for a
    /// whole-day deletion.
    pub fn new(day_key: impl Into<String>, records: &[Record]) -> Self {
        Self {
            day_key: day_key.into(),
            records: records.iter().map(PayloadRecord::from).collect(),
        }
    }

    /// The committed records in staging-layer form (without ids).
    pub fn to_records(&self) -> Vec<Record> {
        self.records.iter().map(Record::from).collect()
    }
}

/// All day updates for one subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectUpdate {
    pub subject_id: String,
    pub updates: Vec<DayUpdate>,
}

impl SubjectUpdate {
    /// Total number of day updates across a batch.
    pub fn day_count(batch: &[SubjectUpdate]) -> usize {
        batch.iter().map(|s| s.updates.len()).sum()
    }

    /// Encode a batch as a single JSON line (outbox format).
    pub fn batch_to_json_line(batch: &[SubjectUpdate]) -> Result<String, ChangeSetError> {
        Ok(serde_json::to_string(batch)?)
    }

    /// Decode a batch from JSON.
    pub fn batch_from_json(json: &str) -> Result<Vec<SubjectUpdate>, ChangeSetError> {
        let batch: Vec<SubjectUpdate> = serde_json::from_str(json)?;
        if let Some(bad) = batch.iter().find(|s| s.subject_id.is_empty()) {
            return Err(ChangeSetError::InvalidData(format!(
                "batch update with empty subject id ({} day updates)",
                bad.updates.len()
            )));
        }
        Ok(batch)
    }
}
