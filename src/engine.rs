//! Transfer engine: header handling and the socket-to-disk copy loop.
//!
//! Byte accounting always covers the whole file: a resumed transfer starts
//! counting at the resume offset, so `bytes_received` is the on-disk size.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use crate::cancel::CancelScope;
use crate::codec::{self, TransferHeader};
use crate::error::{Result, TransferError};
use crate::planner::{PlanMode, TransferPlan};
use crate::protocol::DEFAULT_CHUNK_SIZE;

/// Result of one copy loop. `complete` holds iff every expected byte arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub bytes_received: u64,
    pub expected_bytes: u64,
    pub complete: bool,
}

impl TransferOutcome {
    pub fn new(bytes_received: u64, expected_bytes: u64) -> Self {
        Self {
            bytes_received,
            expected_bytes,
            complete: bytes_received == expected_bytes,
        }
    }

    pub fn missing(&self) -> u64 {
        self.expected_bytes.saturating_sub(self.bytes_received)
    }
}

/// Open the destination: append to an existing partial file when resuming,
/// otherwise create (or truncate) it.
pub fn open_target(path: &Path, offset: u64) -> io::Result<File> {
    if offset > 0 {
        OpenOptions::new().append(true).open(path)
    } else {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }
}

/// Copy payload bytes from `src` to `dst` until `expected` is reached, the
/// stream ends, or `cancel` fires. Never reads past `expected`.
///
/// A read failure ends the loop like an EOF (the partial stays usable for a
/// later resume); write failures are returned.
pub fn copy_payload<R, W, F>(
    src: &mut R,
    dst: &mut W,
    offset: u64,
    expected: u64,
    chunk_size: usize,
    cancel: &CancelScope,
    mut on_progress: F,
) -> io::Result<TransferOutcome>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64, u64),
{
    let chunk_size = chunk_size.max(1);
    let mut buf = vec![0u8; chunk_size];
    let mut received = offset;
    while received < expected {
        if cancel.is_cancelled() {
            break;
        }
        let want = (expected - received).min(chunk_size as u64) as usize;
        let n = match src.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        dst.write_all(&buf[..n])?;
        received += n as u64;
        on_progress(received, expected);
    }
    dst.flush()?;
    Ok(TransferOutcome::new(received, expected))
}

#[derive(Debug, Clone, Copy)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferEngine {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(TransferError::Config("chunk size must be at least 1 byte".into()));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Consume a GET/RESUME response for `plan`: parse the header, open the
    /// target and stream the payload into it.
    ///
    /// The target is only touched once the header has been accepted, so a
    /// rejected or malformed response leaves disk state as it was.
    pub fn receive<R, F>(
        &self,
        resp: &mut R,
        plan: &TransferPlan,
        cancel: &CancelScope,
        on_progress: F,
    ) -> Result<(TransferHeader, TransferOutcome)>
    where
        R: BufRead,
        F: FnMut(u64, u64),
    {
        let offset = plan.offset();
        let resuming = matches!(plan.mode, PlanMode::Resume { .. });
        let header = codec::read_transfer_header(resp, resuming)?;
        if header.total < offset {
            return Err(TransferError::protocol(format!(
                "peer reports {} bytes total, below resume offset {}",
                header.total, offset
            )));
        }

        let mut file = open_target(&plan.target, offset)?;
        let outcome = copy_payload(
            resp,
            &mut file,
            offset,
            header.total,
            self.chunk_size,
            cancel,
            on_progress,
        )?;
        Ok((header, outcome))
    }
}
