// op.rs: Classification of a staged change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a staged draft does to its base.
///
/// `Noop` marks an entry whose draft was edited back to something
/// semantically identical to its base.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StagedOp {
    Create,
    Update,
    Delete,
    Noop,
}

impl StagedOp {
    /// Classify by emptiness alone, before any equality check.
    ///
    /// Empty base with a non-empty draft is a create, a non-empty base with
    /// an empty draft is a delete, everything else is an update.
    pub fn from_shape(base_empty: bool, draft_empty: bool) -> Self {
        match (base_empty, draft_empty) {
            (true, false) => Self::Create,
            (false, true) => Self::Delete,
            _ => Self::Update,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Noop => "noop",
        }
    }

    /// Whether this op carries a change worth committing.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}

impl fmt::Display for StagedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_classification() {
        assert_eq!(StagedOp::from_shape(true, false), StagedOp::Create);
        assert_eq!(StagedOp::from_shape(false, true), StagedOp::Delete);
        assert_eq!(StagedOp::from_shape(false, false), StagedOp::Update);
        assert_eq!(StagedOp::from_shape(true, true), StagedOp::Update);
    }

    #[test]
    fn serializes_as_lowercase() {
        assert_eq!(serde_json::to_string(&StagedOp::Create).unwrap(), "\"create\"");
        assert_eq!(serde_json::to_string(&StagedOp::Noop).unwrap(), "\"noop\"");
        let op: StagedOp = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(op, StagedOp::Delete);
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(StagedOp::Update.to_string(), "update");
    }
}
