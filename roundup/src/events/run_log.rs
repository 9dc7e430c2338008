//! Append-only JSON-lines run log.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::EventSink;
use crate::utils::iso_timestamp;

/// File name of the run log inside the output root.
pub const RUN_LOG_FILE: &str = "run.log.jsonl";

/// Writes one timestamped JSON object per event.
pub struct JsonlRunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlRunLog {
    /// Opens (or creates) the log at `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Opens the log under an output root.
    pub fn in_dir(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::open(root.as_ref().join(RUN_LOG_FILE))
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event_type: &str, data: Option<serde_json::Value>) {
        let line = serde_json::json!({
            "ts": iso_timestamp(),
            "event": event_type,
            "data": data,
        });
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{line}") {
            warn!(path = %self.path.display(), error = %e, "Failed to append to run log");
        }
    }
}

impl std::fmt::Debug for JsonlRunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlRunLog").field("path", &self.path).finish()
    }
}

#[async_trait]
impl EventSink for JsonlRunLog {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.append(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.append(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlRunLog::in_dir(dir.path()).unwrap();

        log.try_emit("run.started", Some(serde_json::json!({"topics": 2})));
        log.try_emit("run.completed", None);

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "run.started");
        assert_eq!(lines[0]["data"]["topics"], 2);
        assert!(lines[1]["ts"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_run_log_reopen_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        JsonlRunLog::in_dir(dir.path()).unwrap().try_emit("a", None);
        JsonlRunLog::in_dir(dir.path()).unwrap().try_emit("b", None);

        let raw = std::fs::read_to_string(dir.path().join(RUN_LOG_FILE)).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
