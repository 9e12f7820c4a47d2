//! Staging configuration structures

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StagingError;

/// Top-level configuration from `daygrid.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StagingConfig {
    /// Staging session behaviour
    #[serde(default)]
    pub staging: SessionConfig,

    /// Base dataset location
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Commit sink
    #[serde(default)]
    pub commit: CommitConfig,

    /// Log filter
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Staging session behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Give id-less records a UUID when they are staged
    #[serde(default = "default_true")]
    pub assign_record_ids: bool,

    /// Reject edits while a batch commit is pending
    #[serde(default = "default_true")]
    pub reject_edits_during_commit: bool,

    /// Reload the base dataset after a rejected commit
    #[serde(default = "default_true")]
    pub reload_on_failure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            assign_record_ids: true,
            reject_edits_during_commit: true,
            reload_on_failure: true,
        }
    }
}

/// Base dataset location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetConfig {
    /// JSON file holding committed records
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
        }
    }
}

/// Commit sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitConfig {
    /// JSONL file that committed batches are appended to
    #[serde(default = "default_outbox")]
    pub outbox: PathBuf,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            outbox: default_outbox(),
        }
    }
}

/// Log filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

// Serde default functions
fn default_true() -> bool {
    true
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("base.json")
}

fn default_outbox() -> PathBuf {
    PathBuf::from("outbox.jsonl")
}

fn default_filter() -> String {
    "info".to_string()
}

impl StagingConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, StagingError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StagingError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> Result<Self, StagingError> {
        toml::from_str(content).map_err(|e| StagingError::Config(e.to_string()))
    }

    /// Try to load config, returning defaults if the file is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("ignoring unreadable config, using defaults: {}", e);
                }
                Self::default()
            }
        }
    }
}
