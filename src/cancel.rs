//! Cooperative cancellation shared between the Ctrl-C handler and the batch.
//!
//! Every interrupt bumps a counter. A copy loop watches for any interrupt that
//! arrived after it started ([`CancelScope`]); the batch stops once a second
//! interrupt has been seen in the same run.
//!
//! A blocked socket read never sees the counter, so sockets registered with
//! [`CancelScope::watch`] are shut down on every interrupt. The read then ends
//! with EOF and the copy loop stops like on a truncated stream.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Interrupts needed before the whole batch is abandoned.
pub const BATCH_CANCEL_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    hits: Arc<AtomicUsize>,
    watched: Arc<Mutex<Vec<(u64, TcpStream)>>>,
    next_watch: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interrupt. Safe to call from a signal handler thread.
    pub fn signal(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if let Ok(watched) = self.watched.lock() {
            for (_, stream) in watched.iter() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    #[cfg(test)]
    fn watched_len(&self) -> usize {
        self.watched.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// True once the run should stop scheduling further files.
    pub fn batch_cancelled(&self) -> bool {
        self.hits() >= BATCH_CANCEL_THRESHOLD
    }

    /// Start watching for interrupts that arrive from now on.
    pub fn scope(&self) -> CancelScope {
        CancelScope {
            token: self.clone(),
            baseline: self.hits(),
        }
    }
}

/// Cancellation view for one file's copy loop.
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancelToken,
    baseline: usize,
}

impl CancelScope {
    /// A scope that never fires.
    pub fn never() -> Self {
        CancelToken::new().scope()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.hits() > self.baseline
    }

    /// Shut `stream` down as soon as this scope is cancelled, including when
    /// that already happened. Stops watching when the guard drops.
    pub fn watch(&self, stream: &TcpStream) -> io::Result<WatchGuard> {
        let handle = stream.try_clone()?;
        let id = self.token.next_watch.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut watched) = self.token.watched.lock() {
            watched.push((id, handle));
        }
        // An interrupt between scope() and the push above found nothing to shut
        if self.is_cancelled() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(WatchGuard {
            token: self.token.clone(),
            id,
        })
    }
}

/// Registration of one socket with a [`CancelToken`].
#[derive(Debug)]
pub struct WatchGuard {
    token: CancelToken,
    id: u64,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Ok(mut watched) = self.token.watched.lock() {
            watched.retain(|(id, _)| *id != self.id);
        }
    }
}
