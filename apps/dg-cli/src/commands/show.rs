// show.rs: Print committed records for one subject and day.

use std::path::Path;

use anyhow::Context;
use dg_staging::{BaseDataset, JsonFileDataset};

pub fn execute(dataset_path: &Path, subject: &str, day: &str) -> anyhow::Result<()> {
    let dataset = JsonFileDataset::open(dataset_path)
        .with_context(|| format!("failed to open dataset {}", dataset_path.display()))?;
    let records = dataset.read(subject, day);
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
