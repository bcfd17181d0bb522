//! Batch driver: catalog, plan, transfer, one file at a time.
//!
//! Per-file failures are folded into a [`FileOutcome`] so a single bad file
//! never stops the batch. Only a batch-level cancellation (second interrupt)
//! ends a run early.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::catalog::{self, Inventory, InventoryEntry};
use crate::codec::Command;
use crate::engine::{TransferEngine, TransferOutcome};
use crate::error::{Result, TransferError};
use crate::logger::{Logger, NoopLogger};
use crate::planner::{self, PlanMode};
use crate::protocol::DEFAULT_CHUNK_SIZE;
use crate::session::{Endpoint, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Continue partial files instead of downloading next to them.
    pub resume: bool,
    pub chunk_size: usize,
    /// Re-fetch the catalog before each transfer and refuse to act on an
    /// index whose entry changed. Off by default: indices are then trusted
    /// against the single snapshot fetched at the start of the batch.
    pub refetch: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            resume: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            refetch: false,
        }
    }
}

/// What happened to one inventory entry.
#[derive(Debug)]
pub enum FileOutcome {
    Completed {
        target: PathBuf,
        outcome: TransferOutcome,
        resumed_from: u64,
    },
    Skipped {
        target: PathBuf,
    },
    /// The stream ended (or was cancelled) early; the partial file is kept.
    Partial {
        target: PathBuf,
        outcome: TransferOutcome,
        resumed_from: u64,
        cancelled: bool,
    },
    Failed {
        error: TransferError,
    },
}

impl FileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Completed { .. } => "completed",
            FileOutcome::Skipped { .. } => "skipped",
            FileOutcome::Partial { .. } => "partial",
            FileOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            FileOutcome::Completed { .. } | FileOutcome::Skipped { .. }
        )
    }

    pub fn target(&self) -> Option<&Path> {
        match self {
            FileOutcome::Completed { target, .. }
            | FileOutcome::Skipped { target }
            | FileOutcome::Partial { target, .. } => Some(target.as_path()),
            FileOutcome::Failed { .. } => None,
        }
    }

    /// Bytes that crossed the wire during this run.
    pub fn bytes_transferred(&self) -> u64 {
        match self {
            FileOutcome::Completed {
                outcome,
                resumed_from,
                ..
            }
            | FileOutcome::Partial {
                outcome,
                resumed_from,
                ..
            } => outcome.bytes_received.saturating_sub(*resumed_from),
            FileOutcome::Skipped { .. } | FileOutcome::Failed { .. } => 0,
        }
    }

    /// A partial outcome expressed as the error it represents.
    pub fn partial_error(&self) -> Option<TransferError> {
        match self {
            FileOutcome::Partial {
                target, outcome, ..
            } => Some(TransferError::PartialTransfer {
                path: target.clone(),
                received: outcome.bytes_received,
                expected: outcome.expected_bytes,
            }),
            _ => None,
        }
    }

    /// Message for anything that did not succeed.
    pub fn error_message(&self) -> Option<String> {
        match self {
            FileOutcome::Failed { error } => Some(error.to_string()),
            FileOutcome::Partial { .. } => self.partial_error().map(|e| e.to_string()),
            _ => None,
        }
    }

    /// Human-readable one-line detail for logs.
    pub fn detail(&self) -> String {
        match self {
            FileOutcome::Completed {
                target, outcome, ..
            } => format!("bytes={} target={}", outcome.bytes_received, target.display()),
            FileOutcome::Skipped { target } => format!("target={}", target.display()),
            FileOutcome::Partial {
                target,
                outcome,
                cancelled,
                ..
            } => format!(
                "bytes={}/{} cancelled={} target={}",
                outcome.bytes_received,
                outcome.expected_bytes,
                cancelled,
                target.display()
            ),
            FileOutcome::Failed { error } => format!("kind={} error={}", error.kind(), error),
        }
    }
}

/// Aggregate of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub partial: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Completed { .. } => self.succeeded += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Partial { .. } => self.partial += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.bytes_transferred += outcome.bytes_transferred();
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.partial + self.failed
    }

    /// Files that still need another run.
    pub fn unfinished(&self) -> usize {
        self.total
            .saturating_sub(self.succeeded)
            .saturating_sub(self.skipped)
    }

    pub fn all_ok(&self) -> bool {
        !self.cancelled && self.unfinished() == 0
    }
}

pub struct Client {
    endpoint: Endpoint,
    options: ClientOptions,
    engine: TransferEngine,
    logger: Arc<dyn Logger>,
    cancel: CancelToken,
}

impl Client {
    pub fn new(endpoint: Endpoint, options: ClientOptions) -> Result<Self> {
        let engine = TransferEngine::new(options.chunk_size)?;
        Ok(Self {
            endpoint,
            options,
            engine,
            logger: Arc::new(NoopLogger),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn fetch_catalog(&self) -> Result<Inventory> {
        let inventory = catalog::fetch_catalog(&self.endpoint, &self.cancel.scope())?;
        self.logger.catalog(&inventory);
        Ok(inventory)
    }

    pub fn count(&self) -> Result<usize> {
        catalog::fetch_count(&self.endpoint, &self.cancel.scope())
    }

    /// Download the entry at `index` of `inventory` into `dest`.
    pub fn download(&self, inventory: &Inventory, index: usize, dest: &Path) -> FileOutcome {
        match inventory.get(index) {
            Ok(entry) => self.download_entry(entry, dest, false),
            Err(error) => {
                self.logger.error("index", &error.to_string());
                FileOutcome::Failed { error }
            }
        }
    }

    fn download_entry(&self, entry: &InventoryEntry, dest: &Path, verify: bool) -> FileOutcome {
        let outcome = match self.try_download(entry, dest, verify) {
            Ok(outcome) => outcome,
            Err(error) => FileOutcome::Failed { error },
        };
        self.logger.finished(entry, &outcome);
        outcome
    }

    fn try_download(&self, entry: &InventoryEntry, dest: &Path, verify: bool) -> Result<FileOutcome> {
        fs::create_dir_all(dest)?;
        let plan = planner::plan(entry, dest, self.options.resume)?;
        self.logger.start(entry, &plan);

        let command = match plan.mode {
            PlanMode::Skip => {
                return Ok(FileOutcome::Skipped {
                    target: plan.target,
                })
            }
            PlanMode::Resume { offset } => Command::Resume {
                index: entry.index,
                offset,
            },
            PlanMode::Fresh => Command::Get { index: entry.index },
        };

        if verify {
            self.verify_entry(entry)?;
        }

        let scope = self.cancel.scope();
        let mut session = Session::open(&self.endpoint)?;
        session.watch(&scope)?;
        let mut resp = session.send(command)?;
        let (header, outcome) = self
            .engine
            .receive(&mut resp, &plan, &scope, |so_far, total| {
                self.logger.progress(entry, so_far, total)
            })?;
        drop(resp);

        if header.filename != entry.name {
            let msg = format!(
                "peer names this file {:?}; saved as {}",
                header.filename,
                plan.target.display()
            );
            self.logger.notice(entry, &msg);
        }
        if let Some(echoed) = header.echoed_offset {
            if echoed != plan.offset() {
                self.logger.notice(
                    entry,
                    &format!("peer resumed at {} (requested {})", echoed, plan.offset()),
                );
            }
        }

        let resumed_from = plan.offset();
        if outcome.complete {
            Ok(FileOutcome::Completed {
                target: plan.target,
                outcome,
                resumed_from,
            })
        } else {
            Ok(FileOutcome::Partial {
                target: plan.target,
                outcome,
                resumed_from,
                cancelled: scope.is_cancelled(),
            })
        }
    }

    /// Re-fetch the catalog and make sure `entry.index` still names the same file.
    fn verify_entry(&self, entry: &InventoryEntry) -> Result<()> {
        let fresh = catalog::fetch_catalog(&self.endpoint, &self.cancel.scope())?;
        let current = fresh.get(entry.index)?;
        if current.name != entry.name || current.size != entry.size {
            return Err(TransferError::protocol(format!(
                "entry {} changed since the catalog was fetched ({} {}B -> {} {}B)",
                entry.index, entry.name, entry.size, current.name, current.size
            )));
        }
        Ok(())
    }

    /// Fetch the catalog and download `selection` (or every entry) into `dest`.
    ///
    /// A catalog failure aborts the run; anything after that is per file.
    pub fn download_all(&self, dest: &Path, selection: Option<&[usize]>) -> Result<BatchSummary> {
        let start = Instant::now();
        let inventory = self.fetch_catalog()?;
        let summary = self.download_inventory(&inventory, dest, selection, start);
        Ok(summary)
    }

    /// Download from an already fetched snapshot.
    pub fn download_inventory(
        &self,
        inventory: &Inventory,
        dest: &Path,
        selection: Option<&[usize]>,
        start: Instant,
    ) -> BatchSummary {
        let indices: Vec<usize> = match selection {
            Some(sel) => sel.to_vec(),
            None => (0..inventory.len()).collect(),
        };
        let mut summary = BatchSummary {
            total: indices.len(),
            ..BatchSummary::default()
        };

        for index in indices {
            if self.cancel.batch_cancelled() {
                break;
            }
            let outcome = match inventory.get(index) {
                Ok(entry) => self.download_entry(entry, dest, self.options.refetch),
                Err(error) => {
                    self.logger.error("index", &error.to_string());
                    FileOutcome::Failed { error }
                }
            };
            summary.record(&outcome);
        }

        summary.cancelled = self.cancel.batch_cancelled();
        summary.elapsed = start.elapsed();
        self.logger.done(&summary);
        summary
    }
}
