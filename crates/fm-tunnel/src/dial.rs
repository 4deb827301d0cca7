//! Per-host dial queue
//!
//! All "open a channel to X" requests for one host go through a single
//! bounded mpsc queue consumed by one task that owns the session handle.
//! Requests are taken into service in submission order; each dial then runs
//! in its own task, so completions may arrive out of order and a stuck dial
//! never blocks the ones behind it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use fm_core::error::{ConnectionError, DialError};
use fm_core::RemoteAddr;

use crate::ssh::{BoxedStream, RemoteSession};

/// Outcome delivered to a dialing caller
pub type DialResult = Result<BoxedStream, DialError>;

/// A pending "open a channel" request
pub struct DialRequest {
    /// Where to connect through the session
    pub remote: RemoteAddr,
    /// Single-use answer slot
    reply_tx: oneshot::Sender<DialResult>,
}

impl DialRequest {
    /// Answer the request; a caller that gave up is not an error.
    pub fn respond(self, result: DialResult) {
        if self.reply_tx.send(result).is_err() {
            tracing::debug!("Caller dropped before receiving dial result for {}", self.remote);
        }
    }
}

/// Submission side of a host's dial queue
#[derive(Clone)]
pub struct DialQueue {
    tx: mpsc::Sender<DialRequest>,
}

impl DialQueue {
    /// Create a queue and the receiver its consumer will drain
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DialRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Submit a dial for `remote` and wait for its result
    pub async fn dial(&self, remote: RemoteAddr) -> DialResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DialRequest { remote, reply_tx })
            .await
            .map_err(|_| DialError::QueueClosed)?;
        reply_rx.await.map_err(|_| DialError::QueueClosed)?
    }

    /// Whether the consumer is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the single consumer loop for a connected host.
///
/// Runs until `cancel` fires or every [`DialQueue`] clone is dropped.
/// Requests still queued at that point are answered with
/// [`DialError::NotConnected`].
pub fn spawn_dial_service(
    host: String,
    session: Arc<dyn RemoteSession>,
    mut rx: mpsc::Receiver<DialRequest>,
    dial_timeout: Option<Duration>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Dial service started for {}", host);

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            tracing::debug!("Dialing {} through {}", request.remote, host);
            tokio::spawn(serve_dial(
                Arc::clone(&session),
                request,
                dial_timeout,
                cancel.clone(),
            ));
        }

        rx.close();
        while let Ok(request) = rx.try_recv() {
            request.respond(Err(DialError::NotConnected));
        }

        tracing::debug!("Dial service stopped for {}", host);
    })
}

async fn serve_dial(
    session: Arc<dyn RemoteSession>,
    request: DialRequest,
    dial_timeout: Option<Duration>,
    cancel: CancellationToken,
) {
    let target = request.remote.clone();
    let remote = target.to_string();
    let open = session.open_channel(&target);

    let result = tokio::select! {
        _ = cancel.cancelled() => Err(DialError::NotConnected),
        result = async {
            match dial_timeout {
                Some(limit) => tokio::time::timeout(limit, open)
                    .await
                    .unwrap_or_else(|_| Err(ConnectionError::Timeout(limit))),
                None => open.await,
            }
        } => result.map_err(|e| match e {
            ConnectionError::Timeout(timeout) => DialError::Timeout {
                remote: remote.clone(),
                timeout,
            },
            other => DialError::ChannelFailed {
                remote: remote.clone(),
                message: other.to_string(),
            },
        }),
    };

    if let Err(e) = &result {
        tracing::warn!("Dial failed: {}", e);
    }
    request.respond(result);
}
