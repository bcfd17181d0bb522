//! Line-oriented wire codec shared by the catalog fetcher and the transfer engine
//!
//! Requests are a single newline-terminated line. Responses start with a status
//! line, followed by decimal header lines and (optionally) a raw payload whose
//! length was announced by an earlier header line.

use std::fmt;
use std::io::{BufRead, Read, Write};

use crate::error::{Result, TransferError};
use crate::protocol::{verb, MAX_LINE_LEN, STATUS_OK};

/// A request line understood by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    List,
    Count,
    Get { index: usize },
    Resume { index: usize, offset: u64 },
}

impl Command {
    /// Encode as a wire line (including the trailing newline).
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(self.to_line().as_bytes())?;
        w.flush()?;
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List => f.write_str(verb::LIST),
            Command::Count => f.write_str(verb::COUNT),
            Command::Get { index } => write!(f, "{} {}", verb::GET, index),
            Command::Resume { index, offset } => {
                write!(f, "{} {} {}", verb::RESUME, index, offset)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed(String),
}

/// Header block that precedes a GET/RESUME payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// Target total size of the file (not the remaining byte count).
    pub total: u64,
    /// Offset echoed back by a RESUME response.
    pub echoed_offset: Option<u64>,
    /// File name as declared by the peer.
    pub filename: String,
}

/// Read one header line, without its `\n` / `\r\n` terminator.
pub fn read_line<R: BufRead>(r: &mut R, what: &str) -> Result<String> {
    let mut buf = Vec::new();
    let n = r.by_ref().take(MAX_LINE_LEN + 1).read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(TransferError::protocol(format!(
            "unexpected end of stream while reading {what}"
        )));
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() as u64 > MAX_LINE_LEN {
            return Err(TransferError::protocol(format!("{what} line too long")));
        }
        return Err(TransferError::protocol(format!(
            "stream ended inside {what} line"
        )));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf)
        .map_err(|_| TransferError::protocol(format!("{what} line is not valid UTF-8")))
}

pub fn read_status<R: BufRead>(r: &mut R) -> Result<Status> {
    let line = read_line(r, "status")?;
    let token = line.trim();
    if token == STATUS_OK {
        Ok(Status::Ok)
    } else {
        Ok(Status::Failed(token.to_string()))
    }
}

/// Read a decimal, non-negative integer on its own line.
pub fn read_number<R: BufRead>(r: &mut R, what: &str) -> Result<u64> {
    let line = read_line(r, what)?;
    line.trim()
        .parse::<u64>()
        .map_err(|_| TransferError::protocol(format!("invalid {what} line: {line:?}")))
}

/// The error-message line that follows a failure status. A peer that closes
/// right after the status yields an empty message.
pub fn read_failure_message<R: BufRead>(r: &mut R) -> String {
    read_line(r, "error message").unwrap_or_default()
}

/// Read exactly `len` payload bytes.
pub fn read_payload<R: Read>(r: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(1 << 20) as usize);
    r.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(TransferError::protocol(format!(
            "payload truncated: declared {} bytes, received {}",
            len,
            buf.len()
        )));
    }
    Ok(buf)
}

/// Fail if the peer sent anything beyond the declared payload.
pub fn expect_end<R: BufRead>(r: &mut R) -> Result<()> {
    let extra = r.fill_buf()?.len();
    if extra > 0 {
        return Err(TransferError::protocol(format!(
            "{extra} unexpected byte(s) after declared payload"
        )));
    }
    Ok(())
}

/// Parse the GET (`resume == false`) or RESUME header block.
pub fn read_transfer_header<R: BufRead>(r: &mut R, resume: bool) -> Result<TransferHeader> {
    if let Status::Failed(status) = read_status(r)? {
        let message = read_failure_message(r);
        return Err(TransferError::Rejected { status, message });
    }
    let total = read_number(r, "size")?;
    let echoed_offset = if resume {
        Some(read_number(r, "offset")?)
    } else {
        None
    };
    let filename = read_line(r, "filename")?;
    Ok(TransferHeader {
        total,
        echoed_offset,
        filename,
    })
}
