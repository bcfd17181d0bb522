use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use mediapull::cancel::{CancelToken, BATCH_CANCEL_THRESHOLD};
use mediapull::cli::{selection_indices, Cli, Cmd};
use mediapull::client::Client;
use mediapull::config::Config;
use mediapull::forward::{forward_hints, setup_port_forward};
use mediapull::history::{HistoryLogger, TransferHistory};
use mediapull::logger::{Loggers, TextLogger};
use mediapull::progress::{format_size, print_catalog, ConsoleProgress};

/// Exit status after the batch was stopped by a second interrupt (128 + SIGINT).
const EXIT_CANCELLED: i32 = 130;

fn main() -> Result<()> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.signal();
        if handler_token.hits() > BATCH_CANCEL_THRESHOLD {
            // Whatever is still blocking is not a watched socket; give up now
            eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
            std::process::exit(EXIT_CANCELLED);
        }
        if handler_token.batch_cancelled() {
            eprintln!("\nInterrupted again. Stopping the batch...");
        } else {
            eprintln!("\nInterrupted. Abandoning the current file (Ctrl-C again to stop)...");
        }
    })
    .expect("Error setting Ctrl-C handler");

    let cli = Cli::parse();
    let code = run(&cli, cancel)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run(cli: &Cli, cancel: CancelToken) -> Result<i32> {
    let config = cli.settings().context("Failed to load settings")?;

    match cli.command() {
        Cmd::History { dest } => {
            let dest = dest.unwrap_or_else(|| config.dest_dir());
            show_history(&dest)?;
            Ok(0)
        }
        Cmd::Count => {
            forward(&config)?;
            let client =
                Client::new(config.endpoint(), config.client_options())?.with_cancel(cancel);
            println!("{}", client.count()?);
            Ok(0)
        }
        Cmd::List => {
            forward(&config)?;
            let client =
                Client::new(config.endpoint(), config.client_options())?.with_cancel(cancel);
            print_catalog(&client.fetch_catalog()?);
            Ok(0)
        }
        Cmd::Pull { dest, only } => {
            let dest = dest.unwrap_or_else(|| config.dest_dir());
            let selection = selection_indices(&only)?;
            forward(&config)?;
            pull(&config, &dest, selection.as_deref(), cancel)
        }
    }
}

fn forward(config: &Config) -> Result<()> {
    if !config.forward {
        return Ok(());
    }
    if let Err(e) = setup_port_forward(config.port) {
        eprintln!("Port forwarding failed. Things to try:");
        for (i, hint) in forward_hints(config.port).iter().enumerate() {
            eprintln!("  {}. {}", i + 1, hint);
        }
        return Err(e);
    }
    Ok(())
}

fn pull(config: &Config, dest: &Path, selection: Option<&[usize]>, cancel: CancelToken) -> Result<i32> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let mut loggers = Loggers::new().with(Arc::new(ConsoleProgress::new(dest)));
    if let Some(ref p) = config.log_file {
        // A log that cannot be opened is not worth aborting a pull over
        match TextLogger::new(p) {
            Ok(l) => loggers.push(Arc::new(l)),
            Err(e) => eprintln!("Cannot open log file {}: {e}", p.display()),
        }
    }
    let history = config
        .history
        .then(|| Arc::new(HistoryLogger::new(dest)));
    if let Some(h) = &history {
        loggers.push(h.clone());
    }

    let client = Client::new(config.endpoint(), config.client_options())?
        .with_logger(Arc::new(loggers))
        .with_cancel(cancel);
    let summary = client
        .download_all(dest, selection)
        .context("Failed to fetch the catalog")?;

    if let Some(err) = history.as_ref().and_then(|h| h.last_error()) {
        eprintln!("History not fully written: {err}");
    }

    Ok(if summary.cancelled {
        EXIT_CANCELLED
    } else if summary.partial + summary.failed > 0 {
        1
    } else {
        0
    })
}

fn show_history(dest: &Path) -> Result<()> {
    let history = TransferHistory::new(dest);
    let entries = history.read_log()?;
    if entries.is_empty() {
        println!("No history in {}", history.path().display());
        return Ok(());
    }
    for e in entries {
        println!(
            "{} {:<9} #{:<4} {} {}/{}{}",
            e.timestamp,
            format!("{:?}", e.status).to_lowercase(),
            e.index + 1,
            e.name,
            format_size(e.bytes_received),
            format_size(e.expected_bytes),
            e.error.map(|m| format!("  ({m})")).unwrap_or_default()
        );
    }
    Ok(())
}
