use std::path::PathBuf;

/// Errors produced by the transfer core.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(
        "cannot connect to {addr}: {source}\n  \
         make sure that:\n  \
         1. the phone is connected over USB\n  \
         2. USB debugging is enabled\n  \
         3. the transfer server is started in the app"
    )]
    Connectivity {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("peer rejected request ({status}): {message}")]
    Rejected { status: String, message: String },

    #[error("incomplete transfer of {}: {received}/{expected} bytes", path.display())]
    PartialTransfer {
        path: PathBuf,
        received: u64,
        expected: u64,
    },

    #[error("invalid file index {index} (inventory has {len} entries)")]
    InvalidIndex { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        TransferError::Protocol(msg.into())
    }

    /// Short stable label used in logs and the history file.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Connectivity { .. } => "connectivity",
            TransferError::Protocol(_) => "protocol",
            TransferError::Rejected { .. } => "rejected",
            TransferError::PartialTransfer { .. } => "partial",
            TransferError::InvalidIndex { .. } => "invalid-index",
            TransferError::Config(_) => "config",
            TransferError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
