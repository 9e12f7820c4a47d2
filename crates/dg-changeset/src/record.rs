// record.rs: One allocation entry and helpers over day collections.
//
// A day collection is `Vec<Record>` when it is a committed base, and
// `Option<Vec<Record>>` when it is a draft: `None` marks the whole day as
// staged for deletion, which is a different staged state from an emptied
// list even though both read back as empty.

use serde::{Deserialize, Serialize};

/// One atomic allocation entry within a day's collection.
///
/// The `id` is opaque and never takes part in equality or hashing; two
/// records with the same category, quantity and note are interchangeable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Opaque identifier. Assigned by the staging layer when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Category code (project, leave type, ...).
    #[serde(default)]
    pub category: String,

    /// Allocated quantity (typically hours).
    #[serde(default)]
    pub quantity: f64,

    /// Free-text note.
    #[serde(default)]
    pub note: String,
}

impl Record {
    /// Create an id-less record with an empty note.
    pub fn new(category: impl Into<String>, quantity: f64) -> Self {
        Self {
            id: None,
            category: category.into(),
            quantity,
            note: String::new(),
        }
    }

    /// Set the note and return self (builder pattern).
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Set the opaque id and return self.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// True when a collection is absent or holds no records.
pub fn is_empty_collection(records: Option<&[Record]>) -> bool {
    records.map_or(true, <[Record]>::is_empty)
}

/// Flatten a draft into the list consumers read: `None` becomes empty.
pub fn flatten(records: Option<&[Record]>) -> Vec<Record> {
    records.map(<[Record]>::to_vec).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let record: Record = serde_json::from_str(r#"{"category":"A"}"#).unwrap();
        assert_eq!(record.category, "A");
        assert_eq!(record.quantity, 0.0);
        assert_eq!(record.note, "");
        assert!(record.id.is_none());
    }

    #[test]
    fn absent_id_is_not_serialized() {
        let json = serde_json::to_string(&Record::new("A", 4.0)).unwrap();
        assert!(!json.contains("\"id\""));

        let json = serde_json::to_string(&Record::new("A", 4.0).with_id("r-1")).unwrap();
        assert!(json.contains("\"id\":\"r-1\""));
    }

    #[test]
    fn null_and_empty_are_both_empty_collections() {
        assert!(is_empty_collection(None));
        assert!(is_empty_collection(Some(&[])));
        assert!(!is_empty_collection(Some(&[Record::new("A", 1.0)])));
    }

    #[test]
    fn flatten_turns_whole_day_deletion_into_empty_list() {
        assert!(flatten(None).is_empty());
        let records = vec![Record::new("A", 4.0).with_note("site visit")];
        assert_eq!(flatten(Some(&records)), records);
    }
}
