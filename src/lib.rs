//! mediapull library
//!
//! Client for a line-based file-transfer peer: fetch the catalog, then pull
//! files one connection at a time, resuming from whatever is already on disk.

pub mod cancel;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod forward;
pub mod history;
pub mod logger;
pub mod planner;
pub mod progress;
pub mod protocol;
pub mod session;

pub use catalog::{Inventory, InventoryEntry, MediaKind};
pub use client::{BatchSummary, Client, ClientOptions, FileOutcome};
pub use error::{Result, TransferError};
pub use planner::{PlanMode, TransferPlan};
pub use session::Endpoint;
