use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::catalog::{Inventory, InventoryEntry};
use crate::client::{BatchSummary, FileOutcome};
use crate::planner::{PlanMode, TransferPlan};

/// Event hooks raised by the client. Every method defaults to a no-op so a
/// presentation layer only implements what it renders.
pub trait Logger: Send + Sync {
    fn catalog(&self, _inventory: &Inventory) {}
    fn start(&self, _entry: &InventoryEntry, _plan: &TransferPlan) {}
    fn progress(&self, _entry: &InventoryEntry, _so_far: u64, _total: u64) {}
    fn notice(&self, _entry: &InventoryEntry, _msg: &str) {}
    fn finished(&self, _entry: &InventoryEntry, _outcome: &FileOutcome) {}
    fn error(&self, _context: &str, _msg: &str) {}
    fn done(&self, _summary: &BatchSummary) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Fans every event out to several loggers, in order.
#[derive(Default, Clone)]
pub struct Loggers {
    inner: Vec<Arc<dyn Logger>>,
}

impl Loggers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, logger: Arc<dyn Logger>) {
        self.inner.push(logger);
    }

    pub fn with(mut self, logger: Arc<dyn Logger>) -> Self {
        self.push(logger);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Logger for Loggers {
    fn catalog(&self, inventory: &Inventory) {
        self.inner.iter().for_each(|l| l.catalog(inventory));
    }
    fn start(&self, entry: &InventoryEntry, plan: &TransferPlan) {
        self.inner.iter().for_each(|l| l.start(entry, plan));
    }
    fn progress(&self, entry: &InventoryEntry, so_far: u64, total: u64) {
        self.inner.iter().for_each(|l| l.progress(entry, so_far, total));
    }
    fn notice(&self, entry: &InventoryEntry, msg: &str) {
        self.inner.iter().for_each(|l| l.notice(entry, msg));
    }
    fn finished(&self, entry: &InventoryEntry, outcome: &FileOutcome) {
        self.inner.iter().for_each(|l| l.finished(entry, outcome));
    }
    fn error(&self, context: &str, msg: &str) {
        self.inner.iter().for_each(|l| l.error(context, msg));
    }
    fn done(&self, summary: &BatchSummary) {
        self.inner.iter().for_each(|l| l.done(summary));
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

fn mode_label(mode: PlanMode) -> String {
    match mode {
        PlanMode::Skip => "skip".to_string(),
        PlanMode::Fresh => "fresh".to_string(),
        PlanMode::Resume { offset } => format!("resume offset={offset}"),
    }
}

impl Logger for TextLogger {
    fn catalog(&self, inventory: &Inventory) {
        self.line(&format!(
            "CATALOG files={} bytes={}",
            inventory.len(),
            inventory.total_bytes()
        ));
    }
    fn start(&self, entry: &InventoryEntry, plan: &TransferPlan) {
        self.line(&format!(
            "START index={} name={} size={} mode={} target={}",
            entry.index,
            entry.name,
            entry.size,
            mode_label(plan.mode),
            plan.target.display()
        ));
    }
    fn notice(&self, entry: &InventoryEntry, msg: &str) {
        self.line(&format!("NOTE index={} msg={}", entry.index, msg));
    }
    fn finished(&self, entry: &InventoryEntry, outcome: &FileOutcome) {
        self.line(&format!(
            "FINISH index={} name={} status={} {}",
            entry.index,
            entry.name,
            outcome.label(),
            outcome.detail()
        ));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
    fn done(&self, summary: &BatchSummary) {
        self.line(&format!(
            "DONE ok={} skipped={} partial={} failed={} bytes={} seconds={:.3} cancelled={}",
            summary.succeeded,
            summary.skipped,
            summary.partial,
            summary.failed,
            summary.bytes_transferred,
            summary.elapsed.as_secs_f64(),
            summary.cancelled
        ));
    }
}
