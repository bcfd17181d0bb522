//! Console rendering: catalog listing, per-file byte bars, end-of-run summary.
//!
//! Status lines print above the active bar, the way cargo keeps its
//! "Compiling" line pinned at the bottom.

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::catalog::{Inventory, InventoryEntry, MediaKind};
use crate::client::{BatchSummary, FileOutcome};
use crate::logger::Logger;
use crate::planner::{PlanMode, TransferPlan};

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

fn kind_icon(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "🎬",
        MediaKind::Image => "🖼️",
    }
}

/// Lines for a catalog listing, numbered from 1.
pub fn catalog_lines(inventory: &Inventory) -> Vec<String> {
    inventory
        .iter()
        .map(|e| {
            format!(
                "{:>5}. {} {} ({})",
                e.index + 1,
                kind_icon(e.kind),
                e.name,
                format_size(e.size)
            )
        })
        .collect()
}

pub fn print_catalog(inventory: &Inventory) {
    println!(
        "{} {} files, {}",
        "Catalog".with(Color::Green).bold(),
        inventory.len(),
        format_size(inventory.total_bytes())
    );
    for line in catalog_lines(inventory) {
        println!("{line}");
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
    catalog_len: AtomicUsize,
    dest: String,
}

impl ConsoleProgress {
    pub fn new(dest: &Path) -> Self {
        let dest = std::fs::canonicalize(dest)
            .unwrap_or_else(|_| dest.to_path_buf())
            .display()
            .to_string();
        Self {
            bar: Mutex::new(None),
            catalog_len: AtomicUsize::new(0),
            dest,
        }
    }

    /// Print above the active bar, if there is one.
    fn say(&self, line: String) {
        match self.bar.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(bar) => bar.println(line),
                None => println!("{line}"),
            },
            Err(_) => println!("{line}"),
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut g| g.take())
    }
}

impl Logger for ConsoleProgress {
    fn catalog(&self, inventory: &Inventory) {
        self.catalog_len.store(inventory.len(), Ordering::Relaxed);
        print_catalog(inventory);
        println!("{} {}", "Saving to".with(Color::Green).bold(), self.dest);
        println!();
    }

    fn start(&self, entry: &InventoryEntry, plan: &TransferPlan) {
        let counter = format!(
            "[{}/{}]",
            entry.index + 1,
            self.catalog_len.load(Ordering::Relaxed).max(entry.index + 1)
        );
        let action = match plan.mode {
            PlanMode::Skip => return,
            PlanMode::Fresh => "Downloading".with(Color::Green).bold(),
            PlanMode::Resume { .. } => "Resuming".with(Color::Yellow).bold(),
        };
        let from = match plan.mode {
            PlanMode::Resume { offset } => format!(" from {}", format_size(offset)),
            _ => String::new(),
        };
        self.say(format!(
            "{counter} {action} {} ({}){from}",
            entry.name.as_str().with(Color::Cyan),
            format_size(entry.size)
        ));

        let bar = ProgressBar::new(entry.size);
        bar.set_style(bar_style());
        bar.set_position(plan.offset());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(old) = slot.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn progress(&self, _entry: &InventoryEntry, so_far: u64, _total: u64) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                bar.set_position(so_far);
            }
        }
    }

    fn notice(&self, entry: &InventoryEntry, msg: &str) {
        self.say(format!(
            "  {} {}: {}",
            "note".with(Color::Yellow),
            entry.name,
            msg
        ));
    }

    fn finished(&self, entry: &InventoryEntry, outcome: &FileOutcome) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
        }
        let line = match outcome {
            FileOutcome::Completed { target, .. } => format!(
                "  {} {}",
                "Saved".with(Color::Green).bold(),
                target.display()
            ),
            FileOutcome::Skipped { target } => format!(
                "  {} {} (already complete at {})",
                "Skipped".with(Color::DarkGrey).bold(),
                entry.name,
                target.display()
            ),
            FileOutcome::Partial {
                outcome, cancelled, ..
            } => format!(
                "  {} {}/{} bytes{}",
                "Incomplete".with(Color::Yellow).bold(),
                outcome.bytes_received,
                outcome.expected_bytes,
                if *cancelled { " (interrupted)" } else { "" }
            ),
            FileOutcome::Failed { error } => {
                format!("  {} {}", "Failed".with(Color::Red).bold(), error)
            }
        };
        println!("{line}");
    }

    fn error(&self, context: &str, msg: &str) {
        self.say(format!(
            "{} {}: {}",
            "error".with(Color::Red).bold(),
            context,
            msg
        ));
    }

    fn done(&self, summary: &BatchSummary) {
        if let Some(bar) = self.take_bar() {
            bar.finish_and_clear();
        }
        let rule = "=".repeat(60);
        println!();
        println!("{rule}");
        let heading = if summary.cancelled {
            "Cancelled".with(Color::Yellow).bold()
        } else {
            "Finished".with(Color::Green).bold()
        };
        println!("{heading}");
        println!("  ok:      {}", summary.succeeded);
        println!("  skipped: {}", summary.skipped);
        if summary.partial > 0 {
            println!("  partial: {}", summary.partial);
        }
        if summary.failed > 0 {
            println!("  failed:  {}", summary.failed);
        }
        if summary.unfinished() > summary.partial + summary.failed {
            println!(
                "  not started: {}",
                summary.unfinished() - summary.partial - summary.failed
            );
        }
        println!(
            "  received {} in {:.1}s",
            format_size(summary.bytes_transferred),
            summary.elapsed.as_secs_f64()
        );
        if !summary.all_ok() {
            println!("  run again to resume the remaining files");
        }
        println!("{rule}");
    }
}
