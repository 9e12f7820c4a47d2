// apply.rs: Run an edit script through a staging session.
//
// Commit steps ship the batch to the outbox (one JSON line per batch) and
// reconcile the dataset file. A rejected commit does not stop the script;
// it is reported in the summary and the staged entries stay in place.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dg_changeset::SubjectUpdate;
use dg_staging::{
    BaseDataset, CommitError, CommitReport, JsonFileDataset, StagedMetaMap, StagingConfig,
    StagingSession,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::script::{self, EditStep};

/// Printed to stdout once the script has run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplySummary {
    meta: StagedMetaMap,
    /// Still-staged keys in first-staged order.
    staged: Vec<String>,
    /// What a commit would ship right now.
    payload: Vec<SubjectUpdate>,
    commits: Vec<CommitOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum CommitOutcome {
    Committed { step: usize, report: CommitReport },
    Empty { step: usize },
    Rejected { step: usize, error: String },
}

pub async fn execute(
    config: &StagingConfig,
    dataset_path: &Path,
    script_path: &Path,
    fail_commit: bool,
) -> anyhow::Result<()> {
    let steps = script::load(script_path)?;
    let dataset = JsonFileDataset::open(dataset_path)
        .with_context(|| format!("failed to open dataset {}", dataset_path.display()))?;
    let session = StagingSession::with_config(Arc::new(dataset), config.staging.clone());

    tracing::info!(
        "apply: running {} steps from {}",
        steps.len(),
        script_path.display()
    );

    let mut commits = Vec::new();
    for (index, step) in steps.into_iter().enumerate() {
        let n = index + 1;
        let action = step.action();
        tracing::debug!("apply: step {} ({})", n, action);
        match step {
            EditStep::Stage {
                subject_id,
                day_key,
                records,
            } => {
                let outcome = session
                    .stage_draft(&subject_id, &day_key, records)
                    .with_context(|| format!("step {} ({}) failed", n, action))?;
                tracing::info!("apply: staged {}|{}: {:?}", subject_id, day_key, outcome);
            }
            EditStep::Discard {
                subject_id,
                day_key,
            } => {
                session
                    .discard_entry(&subject_id, &day_key)
                    .with_context(|| format!("step {} ({}) failed", n, action))?;
            }
            EditStep::Reset {
                subject_id,
                day_key,
            } => {
                let outcome = session
                    .reset_entry(&subject_id, &day_key)
                    .with_context(|| format!("step {} ({}) failed", n, action))?;
                tracing::info!("apply: reset {}|{}: {:?}", subject_id, day_key, outcome);
            }
            EditStep::Rollback {
                subject_id,
                day_key,
            } => {
                let removed = session
                    .rollback_entry(&subject_id, &day_key)
                    .with_context(|| format!("step {} ({}) failed", n, action))?;
                if !removed {
                    tracing::info!(
                        "apply: rollback {}|{} kept the entry (draft differs from base)",
                        subject_id,
                        day_key
                    );
                }
            }
            EditStep::DiscardAll => {
                session
                    .discard_all()
                    .with_context(|| format!("step {} ({}) failed", n, action))?;
            }
            EditStep::Commit => {
                commits.push(commit(&session, &config.commit.outbox, fail_commit, n).await?);
            }
        }
    }

    let summary = ApplySummary {
        meta: session.build_staged_meta_map(),
        staged: session.snapshot().order_keys(),
        payload: session.build_batch_payload(),
        commits,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn commit<D: BaseDataset>(
    session: &StagingSession<D>,
    outbox: &Path,
    fail: bool,
    step: usize,
) -> anyhow::Result<CommitOutcome> {
    let result = session
        .confirm_all(|batch| async move {
            if fail {
                return Err(io::Error::other("commit rejected by --fail-commit"));
            }
            append_to_outbox(outbox, &batch).await
        })
        .await;

    match result {
        Ok(Some(report)) => Ok(CommitOutcome::Committed { step, report }),
        Ok(None) => Ok(CommitOutcome::Empty { step }),
        Err(CommitError::Rejected(e)) => {
            tracing::warn!("apply: commit at step {} rejected: {}", step, e);
            Ok(CommitOutcome::Rejected {
                step,
                error: e.to_string(),
            })
        }
        Err(e @ CommitError::InFlight) => Err(e.into()),
    }
}

async fn append_to_outbox(outbox: &Path, batch: &[SubjectUpdate]) -> io::Result<()> {
    let mut line = SubjectUpdate::batch_to_json_line(batch).map_err(io::Error::other)?;
    line.push('\n');

    if let Some(parent) = outbox.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(outbox)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
