//! Bidirectional byte relay between a local client and a remote channel
//!
//! Each side is split into a counting reader and writer that share one
//! cancellation token. Reads wait at most `read_poll` before re-checking the
//! token, so a cancelled relay stops within one poll period even when
//! neither peer is sending.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use fm_core::ByteCount;

/// Copy buffer size per direction
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Errors surfaced by relay wrappers
#[derive(Error, Debug)]
pub enum RelayError {
    /// The relay was cancelled; a normal way to end
    #[error("relay cancelled")]
    Cancelled,
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, RelayError::Cancelled)
}

/// Whether `err` is the wrapper's cancellation error
pub fn is_cancelled(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<RelayError>())
        .is_some()
}

/// Read and write totals for one wrapped stream
#[derive(Debug, Default)]
pub struct StreamCounters {
    read: AtomicU64,
    written: AtomicU64,
}

impl StreamCounters {
    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

/// Read half with a polling deadline and a byte counter
struct CountingReader<S> {
    inner: ReadHalf<S>,
    counters: Arc<StreamCounters>,
    cancel: CancellationToken,
    poll: Duration,
}

impl<S: AsyncRead> CountingReader<S> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(cancelled());
            }
            match tokio::time::timeout(self.poll, self.inner.read(buf)).await {
                Ok(Ok(n)) => {
                    self.counters.read.fetch_add(n as u64, Ordering::Relaxed);
                    return Ok(n);
                }
                Ok(Err(e)) => return Err(e),
                // Deadline hit: loop to observe cancellation
                Err(_) => continue,
            }
        }
    }
}

/// Write half with a byte counter
struct CountingWriter<S> {
    inner: WriteHalf<S>,
    counters: Arc<StreamCounters>,
    cancel: CancellationToken,
}

impl<S: AsyncWrite> CountingWriter<S> {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(cancelled()),
            result = self.inner.write_all(buf) => {
                result?;
                self.counters.written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            tracing::trace!("Shutdown of relay writer failed: {}", e);
        }
    }
}

fn wrap<S>(
    stream: S,
    cancel: CancellationToken,
    poll: Duration,
    counters: Arc<StreamCounters>,
) -> (CountingReader<S>, CountingWriter<S>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (
        CountingReader {
            inner: read_half,
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
            poll,
        },
        CountingWriter {
            inner: write_half,
            counters,
            cancel,
        },
    )
}

/// Live view of one relay session, shared with its owning forward
#[derive(Debug)]
pub struct RelayHandle {
    id: u64,
    peer: SocketAddr,
    cancel: CancellationToken,
    local: Arc<StreamCounters>,
    remote: Arc<StreamCounters>,
}

impl RelayHandle {
    pub fn new(id: u64, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            cancel: CancellationToken::new(),
            local: Arc::new(StreamCounters::default()),
            remote: Arc::new(StreamCounters::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address of the local client
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Flag both sides as cancelled without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Bytes moved so far: `sent` read from the client, `received` read
    /// from the remote
    pub fn bytes(&self) -> ByteCount {
        ByteCount::new(self.local.read(), self.remote.read())
    }

    #[cfg(test)]
    pub(crate) fn record(&self, sent: u64, received: u64) {
        self.local.read.fetch_add(sent, Ordering::Relaxed);
        self.remote.read.fetch_add(received, Ordering::Relaxed);
    }
}

/// Relay timing
#[derive(Debug, Clone, Copy)]
pub struct Relay {
    read_poll: Duration,
    grace: Duration,
}

impl Relay {
    pub fn new(read_poll: Duration, grace: Duration) -> Self {
        Self { read_poll, grace }
    }

    /// Copy both directions until one side ends, then cancel both and give
    /// the other direction `grace` to stop. Returns the final byte counts.
    pub async fn run<L, R>(&self, handle: &RelayHandle, local: L, remote: R) -> ByteCount
    where
        L: AsyncRead + AsyncWrite,
        R: AsyncRead + AsyncWrite,
    {
        let (mut local_rx, mut local_tx) = wrap(
            local,
            handle.cancel.child_token(),
            self.read_poll,
            Arc::clone(&handle.local),
        );
        let (mut remote_rx, mut remote_tx) = wrap(
            remote,
            handle.cancel.child_token(),
            self.read_poll,
            Arc::clone(&handle.remote),
        );

        let upstream = pump(&mut local_rx, &mut remote_tx);
        let downstream = pump(&mut remote_rx, &mut local_tx);
        tokio::pin!(upstream, downstream);

        let (upstream_done, first) = tokio::select! {
            result = &mut upstream => (true, result),
            result = &mut downstream => (false, result),
        };
        log_direction(handle, first);

        handle.cancel();
        let rest = if upstream_done {
            tokio::time::timeout(self.grace, &mut downstream).await
        } else {
            tokio::time::timeout(self.grace, &mut upstream).await
        };
        match rest {
            Ok(result) => log_direction(handle, result),
            Err(_) => tracing::debug!(
                "Relay {} from {} did not stop within {:?}",
                handle.id,
                handle.peer,
                self.grace
            ),
        }

        handle.bytes()
    }
}

async fn pump<S, D>(reader: &mut CountingReader<S>, writer: &mut CountingWriter<D>) -> io::Result<()>
where
    S: AsyncRead,
    D: AsyncWrite,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
    }
}

fn log_direction(handle: &RelayHandle, result: io::Result<()>) {
    match result {
        Ok(()) => {}
        Err(e) if is_cancelled(&e) => {}
        Err(e) => tracing::debug!("Relay {} from {} ended: {}", handle.id, handle.peer, e),
    }
}
