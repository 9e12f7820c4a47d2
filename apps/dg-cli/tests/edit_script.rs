// edit_script.rs: End-to-end runs of the `daygrid` binary.
//
// Each test builds a throwaway project directory (config, base dataset,
// edit script), runs the binary against it, and checks stdout JSON plus
// the files the commit touched.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const BASE: &str = r#"{
  "E1": { "2025-01-05": [ { "category": "A", "quantity": 8.0, "note": "" } ] },
  "E2": { "2025-01-05": [ { "category": "B", "quantity": 4.0, "note": "" } ] }
}"#;

const SCRIPT: &str = r#"[
  {"action": "stage", "subjectId": "E1", "dayKey": "2025-01-05",
   "records": [{"category": "A", "quantity": 6.0}, {"category": "C", "quantity": 2.0, "note": "training"}]},
  {"action": "stage", "subjectId": "E2", "dayKey": "2025-01-05", "records": null},
  {"action": "stage", "subjectId": "E3", "dayKey": "2025-01-06", "records": [{"category": "A", "quantity": 1.0}]},
  {"action": "stage", "subjectId": "E3", "dayKey": "2025-01-06", "records": []},
  {"action": "commit"}
]"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let outbox = dir.path().join("outbox.jsonl");
        fs::write(
            dir.path().join("daygrid.toml"),
            format!("[commit]\noutbox = {:?}\n", outbox.display().to_string()),
        )
        .unwrap();
        fs::write(dir.path().join("base.json"), BASE).unwrap();
        fs::write(dir.path().join("script.json"), SCRIPT).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_daygrid"))
            .arg("--config")
            .arg(self.path("daygrid.toml"))
            .arg("--dataset")
            .arg(self.path("base.json"))
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .unwrap()
    }
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "daygrid failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn commit_rewrites_dataset_and_appends_outbox() {
    let project = Project::new();
    let script = project.path("script.json");
    let summary = stdout_json(&project.run(&["apply", script.to_str().unwrap()]));

    assert_eq!(summary["staged"], Value::Array(vec![]));
    assert_eq!(summary["payload"], Value::Array(vec![]));
    assert_eq!(summary["commits"][0]["status"], "committed");
    assert_eq!(summary["commits"][0]["report"]["subjects"], 2);
    assert_eq!(summary["commits"][0]["report"]["days"], 2);

    let base = read_json(&project.path("base.json"));
    let e1 = base["E1"]["2025-01-05"].as_array().unwrap();
    assert_eq!(e1.len(), 2);
    assert!(e1.iter().any(|r| r["note"] == "training"));
    assert!(base.get("E2").is_none());
    assert!(base.get("E3").is_none());

    let outbox = fs::read_to_string(project.path("outbox.jsonl")).unwrap();
    let lines: Vec<&str> = outbox.lines().collect();
    assert_eq!(lines.len(), 1);
    let batch: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(batch[0]["subjectId"], "E1");
    assert_eq!(batch[1]["subjectId"], "E2");
    assert_eq!(batch[1]["updates"][0]["records"], Value::Array(vec![]));
}

#[test]
fn failed_commit_keeps_everything_staged() {
    let project = Project::new();
    let script = project.path("script.json");
    let summary = stdout_json(&project.run(&["apply", script.to_str().unwrap(), "--fail-commit"]));

    assert_eq!(summary["commits"][0]["status"], "rejected");
    assert_eq!(
        summary["staged"],
        serde_json::json!(["E1|2025-01-05", "E2|2025-01-05", "E3|2025-01-06"])
    );
    assert_eq!(summary["meta"]["E1"]["2025-01-05"], "update");
    assert_eq!(summary["meta"]["E2"]["2025-01-05"], "delete");
    assert!(summary["meta"].get("E3").is_none());
    assert_eq!(summary["payload"].as_array().unwrap().len(), 2);

    assert_eq!(read_json(&project.path("base.json")), serde_json::from_str::<Value>(BASE).unwrap());
    assert!(!project.path("outbox.jsonl").exists());
}

#[test]
fn show_prints_committed_day() {
    let project = Project::new();
    let records = stdout_json(&project.run(&["show", "E2", "2025-01-05"]));
    assert_eq!(records[0]["category"], "B");

    let missing = stdout_json(&project.run(&["show", "E9", "2025-01-05"]));
    assert_eq!(missing, Value::Array(vec![]));
}

#[test]
fn invalid_step_fails_the_run() {
    let project = Project::new();
    let script = project.path("bad.json");
    fs::write(
        &script,
        r#"[{"action": "stage", "subjectId": "", "dayKey": "2025-01-05", "records": []}]"#,
    )
    .unwrap();

    let output = project.run(&["apply", script.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("step 1"));
}
