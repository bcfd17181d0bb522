//! Advisory JSONL history of finished files.
//!
//! Written for humans and tooling only. The planner never reads it: disk
//! state alone decides what to resume.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::catalog::InventoryEntry;
use crate::client::FileOutcome;
use crate::logger::Logger;
use crate::protocol::HISTORY_FILE_NAME;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Skipped,
    Partial,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub run_id: String,
    pub index: usize,
    pub name: String,
    pub target: Option<PathBuf>,
    pub status: TransferStatus,
    pub bytes_received: u64,
    pub expected_bytes: u64,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn from_outcome(run_id: &str, entry: &InventoryEntry, outcome: &FileOutcome) -> Self {
        let (status, bytes_received) = match outcome {
            FileOutcome::Completed { outcome, .. } => {
                (TransferStatus::Completed, outcome.bytes_received)
            }
            FileOutcome::Skipped { .. } => (TransferStatus::Skipped, entry.size),
            FileOutcome::Partial { outcome, .. } => (TransferStatus::Partial, outcome.bytes_received),
            FileOutcome::Failed { .. } => (TransferStatus::Failed, 0),
        };
        HistoryEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            index: entry.index,
            name: entry.name.clone(),
            target: outcome.target().map(Path::to_path_buf),
            status,
            bytes_received,
            expected_bytes: entry.size,
            error: outcome.error_message(),
        }
    }
}

pub struct TransferHistory {
    log_file_path: PathBuf,
}

impl TransferHistory {
    pub fn new(destination_root: &Path) -> Self {
        let log_file_path = destination_root.join(HISTORY_FILE_NAME);
        TransferHistory { log_file_path }
    }

    pub fn path(&self) -> &Path {
        &self.log_file_path
    }

    pub fn add_entry(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.log_file_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open history file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<HistoryEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file =
            File::open(&self.log_file_path).context("Failed to open history file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: HistoryEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Appends one history line per finished file.
pub struct HistoryLogger {
    history: TransferHistory,
    run_id: String,
    last_error: Mutex<Option<String>>,
}

impl HistoryLogger {
    pub fn new(destination_root: &Path) -> Self {
        Self {
            history: TransferHistory::new(destination_root),
            run_id: uuid::Uuid::new_v4().to_string(),
            last_error: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Most recent failure to write the history, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}

impl Logger for HistoryLogger {
    fn finished(&self, entry: &InventoryEntry, outcome: &FileOutcome) {
        let record = HistoryEntry::from_outcome(&self.run_id, entry, outcome);
        if let Err(e) = self.history.add_entry(&record) {
            if let Ok(mut slot) = self.last_error.lock() {
                *slot = Some(format!("{e:#}"));
            }
        }
    }
}
