//! Shared protocol constants for the MediaExplorer line protocol

// Default forwarded port (matches the peer's listener)
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 12345;

// Copy-loop chunk size (64KB), also the peer's send buffer size
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// Upper bound for the LIST payload (64MB) - a catalog larger than this is
// treated as a framing error rather than allocated blindly
pub const MAX_CATALOG_SIZE: u64 = 64 * 1024 * 1024;

// Status token of a successful response; anything else is a failure
pub const STATUS_OK: &str = "OK";

// Command verbs (one per line, arguments separated by a single space)
pub mod verb {
    pub const LIST: &str = "LIST";
    pub const COUNT: &str = "COUNT";
    pub const GET: &str = "GET";
    pub const RESUME: &str = "RESUME";
}

// Catalog "type" value that marks a video; every other value displays as image
pub const KIND_VIDEO: &str = "video";

// Advisory history file kept in the destination directory
pub const HISTORY_FILE_NAME: &str = ".mediapull_history.jsonl";

// Longest header line accepted before the stream is considered out of frame
pub const MAX_LINE_LEN: u64 = 64 * 1024;
