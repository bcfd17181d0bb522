//! One connection, one request.
//!
//! A [`Session`] is opened per logical operation and consumed by [`Session::send`],
//! so a second command can never be issued over the same socket. The socket is
//! shut down when the returned [`Response`] (or an unused session) is dropped.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::net::{Shutdown, TcpStream};

use crate::cancel::{CancelScope, WatchGuard};
use crate::codec::Command;
use crate::error::{Result, TransferError};
use crate::protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_HOST, DEFAULT_PORT};

/// Address of the (forwarded) peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Owns the socket; shutting it down on drop covers every exit path.
struct Connection {
    reader: BufReader<TcpStream>,
    _watch: Option<WatchGuard>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

pub struct Session {
    addr: String,
    conn: Connection,
}

impl Session {
    /// Connect to the peer. Failures are reported once as
    /// [`TransferError::Connectivity`]; callers do not retry.
    pub fn open(endpoint: &Endpoint) -> Result<Self> {
        let addr = endpoint.to_string();
        let stream = TcpStream::connect(&addr).map_err(|source| TransferError::Connectivity {
            addr: addr.clone(),
            source,
        })?;
        tune_socket(&stream);
        Ok(Self {
            addr,
            conn: Connection {
                reader: BufReader::with_capacity(DEFAULT_CHUNK_SIZE, stream),
                _watch: None,
            },
        })
    }

    /// Let interrupts in `scope` shut this connection down, so a stalled
    /// read returns EOF instead of blocking forever.
    pub fn watch(&mut self, scope: &CancelScope) -> Result<()> {
        let guard = scope.watch(self.conn.reader.get_ref())?;
        self.conn._watch = Some(guard);
        Ok(())
    }

    /// Send the one command this session carries and hand back the response stream.
    pub fn send(mut self, command: Command) -> Result<Response> {
        command.write_to(self.conn.reader.get_mut())?;
        Ok(Response {
            addr: self.addr,
            command,
            conn: self.conn,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

/// Buffered response side of a session. Header lines and payload bytes are
/// read from the same buffer, so nothing read ahead is lost.
pub struct Response {
    addr: String,
    command: Command,
    conn: Connection,
}

impl Response {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn command(&self) -> Command {
        self.command
    }
}

impl Read for Response {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn.reader.read(buf)
    }
}

impl BufRead for Response {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.conn.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.conn.reader.consume(amt)
    }
}

// Disable Nagle; the request is one short line and the reply is latency bound
fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}
