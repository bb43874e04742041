use crate::models::EvalRecord;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Append-only JSONL file accumulating chat records pending evaluation
///
/// A single lock serializes appends against the read-then-delete
/// consumption path, so a concurrent chat call cannot interleave with an
/// evaluation run. Consumption is at-most-once: records are gone once
/// `take_all` returns, whether or not the caller's evaluation succeeds.
pub struct EvalQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EvalQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line
    pub async fn append(&self, record: &EvalRecord) -> Result<()> {
        let _guard = self.lock.lock().await;

        let line = serde_json::to_string(record).context("Failed to serialize eval record")?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open queue file: {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to append to queue file: {}", self.path.display()))?;

        Ok(())
    }

    /// Read every pending record and delete the queue file
    ///
    /// Returns `None` when no records have accumulated.
    pub async fn take_all(&self) -> Result<Option<Vec<EvalRecord>>> {
        let _guard = self.lock.lock().await;

        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read queue file: {}", self.path.display()))?;

        let mut records = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            let record = serde_json::from_str(line)
                .with_context(|| format!("Malformed queue line: {}", line))?;
            records.push(record);
        }

        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to delete queue file: {}", self.path.display()))?;

        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records))
        }
    }
}
