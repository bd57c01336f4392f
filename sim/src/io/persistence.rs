//! Persistence seam and the JSON-directory implementation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{RunSummary, TurnRecord};
use crate::metrics::metric::JsonObject;

/// Durable write boundary for run artifacts.
///
/// Called after validation and recording. Failures propagate as run
/// failures; there is no transaction coordination with the action history
/// store, so the store and the durable record can diverge when a write
/// fails mid-turn.
pub trait Persistence {
    /// Write or overwrite the run summary (status transitions).
    fn write_run(&self, run: &RunSummary) -> Result<()>;

    /// Write one immutable turn record.
    fn write_turn(&self, run_id: &str, turn: &TurnRecord) -> Result<()>;

    fn write_turn_metrics(&self, run_id: &str, turn_number: u32, metrics: &JsonObject)
    -> Result<()>;

    fn write_run_metrics(&self, run_id: &str, metrics: &JsonObject) -> Result<()>;
}

/// Writes pretty-printed JSON under `<root>/runs/<run_id>/`.
pub struct JsonDirPersistence {
    root: PathBuf,
}

impl JsonDirPersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }
}

impl Persistence for JsonDirPersistence {
    fn write_run(&self, run: &RunSummary) -> Result<()> {
        let path = self.run_dir(&run.run_id).join("run.json");
        debug!(path = %path.display(), status = ?run.status, "writing run summary");
        write_json_atomic(&path, run)
    }

    fn write_turn(&self, run_id: &str, turn: &TurnRecord) -> Result<()> {
        let path = self
            .run_dir(run_id)
            .join("turns")
            .join(format!("{}.json", turn.turn_number));
        debug!(path = %path.display(), turn = turn.turn_number, "writing turn record");
        write_json_atomic(&path, turn)
    }

    fn write_turn_metrics(
        &self,
        run_id: &str,
        turn_number: u32,
        metrics: &JsonObject,
    ) -> Result<()> {
        let path = self
            .run_dir(run_id)
            .join("metrics")
            .join(format!("turn_{turn_number}.json"));
        write_json_atomic(&path, metrics)
    }

    fn write_run_metrics(&self, run_id: &str, metrics: &JsonObject) -> Result<()> {
        let path = self.run_dir(run_id).join("metrics").join("run.json");
        write_json_atomic(&path, metrics)
    }
}

/// Atomically write pretty JSON with a trailing newline (temp file + rename).
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace artifact {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RunStatus;
    use crate::test_support::turn_record;
    use serde_json::json;

    fn summary(run_id: &str) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            total_turns: 2,
            total_agents: 2,
            feed_algorithm: "chronological".to_string(),
            metric_keys: vec!["turn.actions.total".to_string()],
            completed_at: None,
        }
    }

    /// Verifies write → read preserves the run summary.
    #[test]
    fn run_summary_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let persistence = JsonDirPersistence::new(temp.path());

        persistence.write_run(&summary("run-1")).expect("write");

        let contents = fs::read_to_string(persistence.run_dir("run-1").join("run.json"))
            .expect("read");
        let loaded: RunSummary = serde_json::from_str(&contents).expect("parse");
        assert_eq!(loaded, summary("run-1"));
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn turn_records_land_under_turns_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let persistence = JsonDirPersistence::new(temp.path());

        persistence.write_turn("run-1", &turn_record(3)).expect("write");

        let path = persistence.run_dir("run-1").join("turns").join("3.json");
        let loaded: TurnRecord =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse");
        assert_eq!(loaded.turn_number, 3);
    }

    /// No temp files are left behind after a successful write.
    #[test]
    fn atomic_writes_leave_no_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let persistence = JsonDirPersistence::new(temp.path());

        let mut metrics = JsonObject::new();
        metrics.insert("turn.actions.total".to_string(), json!(7));
        persistence
            .write_turn_metrics("run-1", 0, &metrics)
            .expect("write");
        persistence.write_run_metrics("run-1", &metrics).expect("write");

        let metrics_dir = persistence.run_dir("run-1").join("metrics");
        let leftovers: Vec<_> = fs::read_dir(&metrics_dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(metrics_dir.join("turn_0.json").exists());
        assert!(metrics_dir.join("run.json").exists());
    }
}
