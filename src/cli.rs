//! Command-line surface. Flags override values from the settings file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Result, TransferError};

#[derive(Parser, Debug)]
#[command(
    name = "mediapull",
    author,
    version,
    about = "Pull photos and videos from a phone over a forwarded TCP port"
)]
pub struct Cli {
    #[command(flatten)]
    pub opts: CommonOpts,

    #[command(subcommand)]
    pub command: Option<Cmd>,

    /// Destination directory (same as `pull DEST`)
    pub dest: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonOpts {
    /// Peer host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Peer port (also the port forwarded with adb)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Never append to existing files; save under a new name instead
    #[arg(long, global = true)]
    pub no_resume: bool,

    /// Read size for payload copies, in bytes
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Append a plain-text event log to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// Skip `adb forward`
    #[arg(long, global = true)]
    pub no_forward: bool,

    /// Do not append to the JSONL history in the destination
    #[arg(long, global = true)]
    pub no_history: bool,

    /// Re-check each entry against a fresh catalog before downloading it
    #[arg(long, global = true)]
    pub refetch: bool,

    /// Settings file (default: <config dir>/mediapull/mediapull.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// List the catalog, then download everything (or `--only` some files)
    Pull {
        dest: Option<PathBuf>,

        /// File numbers as shown by `list`, comma separated
        #[arg(long, value_delimiter = ',')]
        only: Vec<usize>,
    },
    /// Print the catalog
    List,
    /// Print the number of files the peer offers
    Count,
    /// Print the transfer history kept in a destination
    History { dest: Option<PathBuf> },
}

impl CommonOpts {
    /// Layer the flags over `config` and validate the result.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
        if self.no_resume {
            config.resume = false;
        }
        if self.no_forward {
            config.forward = false;
        }
        if self.no_history {
            config.history = false;
        }
        if self.refetch {
            config.refetch = true;
        }
        config.validate()
    }
}

impl Cli {
    /// Subcommand to run; a bare invocation is a pull.
    pub fn command(&self) -> Cmd {
        match &self.command {
            Some(cmd) => cmd.clone(),
            None => Cmd::Pull {
                dest: self.dest.clone(),
                only: Vec::new(),
            },
        }
    }

    pub fn settings(&self) -> Result<Config> {
        let mut config = Config::load(self.opts.config.as_deref())?;
        self.opts.apply(&mut config)?;
        Ok(config)
    }
}

/// Turn 1-based numbers from the listing into catalog indices.
pub fn selection_indices(only: &[usize]) -> Result<Option<Vec<usize>>> {
    if only.is_empty() {
        return Ok(None);
    }
    only.iter()
        .map(|&n| {
            n.checked_sub(1)
                .ok_or_else(|| TransferError::Config("file numbers start at 1".into()))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
