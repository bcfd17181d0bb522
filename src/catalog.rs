//! Remote inventory: the `LIST` exchange and its decoded snapshot.

use std::fmt;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelScope;
use crate::codec::{self, Command, Status};
use crate::error::{Result, TransferError};
use crate::protocol::{KIND_VIDEO, MAX_CATALOG_SIZE};
use crate::session::{Endpoint, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Anything that is not exactly `video` displays as an image.
    pub fn from_wire(kind: &str) -> Self {
        if kind == KIND_VIDEO {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Image => f.write_str("image"),
        }
    }
}

/// One remote file. `index` is its position in the snapshot that produced it
/// and is only meaningful against that snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub kind: MediaKind,
    pub meta: EntryMeta,
}

/// Informational fields some peers add to catalog records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    pub id: Option<i64>,
    pub path: Option<String>,
    pub mime_type: Option<String>,
    pub date_modified: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    name: String,
    size: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    date_modified: Option<i64>,
}

/// Immutable snapshot of the peer's file list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn new(entries: Vec<InventoryEntry>) -> Self {
        Self { entries }
    }

    /// Decode the JSON payload of a `LIST` response.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let wire: Vec<WireEntry> = serde_json::from_slice(payload)
            .map_err(|e| TransferError::protocol(format!("catalog does not parse: {e}")))?;
        let entries = wire
            .into_iter()
            .enumerate()
            .map(|(index, w)| InventoryEntry {
                index,
                kind: MediaKind::from_wire(&w.kind),
                name: w.name,
                size: w.size,
                meta: EntryMeta {
                    id: w.id,
                    path: w.path,
                    mime_type: w.mime_type,
                    date_modified: w.date_modified,
                },
            })
            .collect();
        Ok(Self { entries })
    }

    /// Bounds-checked lookup; an out-of-range index never reaches the wire.
    pub fn get(&self, index: usize) -> Result<&InventoryEntry> {
        self.entries.get(index).ok_or(TransferError::InvalidIndex {
            index,
            len: self.entries.len(),
        })
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InventoryEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a InventoryEntry;
    type IntoIter = std::slice::Iter<'a, InventoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Read a complete `LIST` response: status, byte length, exactly that many
/// bytes of JSON and then end of stream.
pub fn read_catalog<R: BufRead>(r: &mut R) -> Result<Inventory> {
    if let Status::Failed(status) = codec::read_status(r)? {
        return Err(TransferError::protocol(format!(
            "catalog request failed with status {status:?}"
        )));
    }
    let len = codec::read_number(r, "catalog length")?;
    if len > MAX_CATALOG_SIZE {
        return Err(TransferError::protocol(format!(
            "catalog length {len} exceeds limit of {MAX_CATALOG_SIZE} bytes"
        )));
    }
    let payload = codec::read_payload(r, len)?;
    codec::expect_end(r)?;
    Inventory::from_json(&payload)
}

/// Fetch a fresh inventory snapshot over its own session.
pub fn fetch_catalog(endpoint: &Endpoint, cancel: &CancelScope) -> Result<Inventory> {
    let mut session = Session::open(endpoint)?;
    session.watch(cancel)?;
    let mut resp = session.send(Command::List)?;
    read_catalog(&mut resp)
}

/// Ask the peer how many files it has queued. The reply is a bare number
/// line with no status.
pub fn fetch_count(endpoint: &Endpoint, cancel: &CancelScope) -> Result<usize> {
    let mut session = Session::open(endpoint)?;
    session.watch(cancel)?;
    let mut resp = session.send(Command::Count)?;
    let n = codec::read_number(&mut resp, "count")?;
    usize::try_from(n).map_err(|_| TransferError::protocol(format!("count {n} out of range")))
}
