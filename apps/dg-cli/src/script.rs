// script.rs: Edit scripts for `daygrid apply`.
//
// A script is a JSON array of steps, each tagged by `action`:
//
//   [
//     {"action": "stage", "subjectId": "E1", "dayKey": "2025-01-05",
//      "records": [{"category": "A", "quantity": 4}]},
//     {"action": "stage", "subjectId": "E2", "dayKey": "2025-01-05", "records": null},
//     {"action": "commit"}
//   ]
//
// `records: null` (or no `records`) stages a whole-day deletion.

use std::path::Path;

use anyhow::Context;
use dg_changeset::Record;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditStep {
    #[serde(rename_all = "camelCase")]
    Stage {
        subject_id: String,
        day_key: String,
        #[serde(default)]
        records: Option<Vec<Record>>,
    },
    #[serde(rename_all = "camelCase")]
    Discard { subject_id: String, day_key: String },
    #[serde(rename_all = "camelCase")]
    Reset { subject_id: String, day_key: String },
    #[serde(rename_all = "camelCase")]
    Rollback { subject_id: String, day_key: String },
    DiscardAll,
    Commit,
}

impl EditStep {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Discard { .. } => "discard",
            Self::Reset { .. } => "reset",
            Self::Rollback { .. } => "rollback",
            Self::DiscardAll => "discard_all",
            Self::Commit => "commit",
        }
    }
}

pub fn parse(json: &str) -> anyhow::Result<Vec<EditStep>> {
    serde_json::from_str(json).context("edit script must be a JSON array of steps")
}

pub fn load(path: &Path) -> anyhow::Result<Vec<EditStep>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read edit script {}", path.display()))?;
    parse(&json).with_context(|| format!("invalid edit script {}", path.display()))
}
