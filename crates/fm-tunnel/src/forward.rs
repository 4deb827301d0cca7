//! Local listener for one forward definition
//!
//! While started, a forward accepts local connections, asks its host's
//! [`DialQueue`] for a remote channel and relays bytes between the two. Live
//! relays are tracked so `stop` can cancel them and wait for them to drain
//! before the socket is released.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use fm_core::config::{ForwardConfig, TunnelSettings};
use fm_core::error::ForwardError;
use fm_core::{BindAddr, ByteCount, ForwardId, HostId, RemoteAddr};

use crate::dial::DialQueue;
use crate::relay::{Relay, RelayHandle};
use crate::view::ForwardView;

/// Live relays and the totals of finished ones
///
/// Kept under one lock so a finishing relay leaves `active` and lands in
/// `finished` in a single step, as seen by [`Forward::bytes`].
#[derive(Default)]
struct Relays {
    active: HashMap<u64, Arc<RelayHandle>>,
    finished: ByteCount,
}

#[derive(Default)]
struct Sessions {
    /// Accepted connections still waiting for a remote channel
    pending: DashMap<u64, Arc<RelayHandle>>,
    relays: Mutex<Relays>,
    next_id: AtomicU64,
}

impl Sessions {
    fn accept(&self, peer: SocketAddr) -> Arc<RelayHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(RelayHandle::new(id, peer));
        self.pending.insert(id, Arc::clone(&handle));
        handle
    }

    /// Promote a dialed connection to a live relay
    fn activate(&self, handle: &Arc<RelayHandle>) {
        let mut relays = self.relays.lock();
        self.pending.remove(&handle.id());
        relays.active.insert(handle.id(), Arc::clone(handle));
    }

    /// Drop a finished connection and keep its bytes
    fn finish(&self, handle: &RelayHandle) {
        let mut relays = self.relays.lock();
        if relays.active.remove(&handle.id()).is_some() {
            relays.finished += handle.bytes();
        }
        self.pending.remove(&handle.id());
    }

    /// Cancel every pending dial and live relay
    fn cancel_all(&self) {
        // Holding the relay lock keeps `activate` from moving a handle
        // between the two sets mid-walk
        let relays = self.relays.lock();
        for handle in relays.active.values() {
            handle.cancel();
        }
        for entry in self.pending.iter() {
            entry.value().cancel();
        }
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.relays.lock().active.is_empty()
    }

    fn bytes(&self) -> ByteCount {
        let relays = self.relays.lock();
        relays
            .active
            .values()
            .fold(relays.finished, |acc, h| acc + h.bytes())
    }
}

/// A running accept loop
struct Listener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    /// Hands the socket back once the loop exits
    task: JoinHandle<TcpListener>,
}

/// A local → remote forwarding rule and its listener
pub struct Forward {
    id: ForwardId,
    spec: Arc<RwLock<ForwardConfig>>,
    settings: Arc<TunnelSettings>,
    sessions: Arc<Sessions>,
    listener: Mutex<Option<Listener>>,
}

impl Forward {
    pub fn new(spec: ForwardConfig, settings: Arc<TunnelSettings>) -> Self {
        Self {
            id: ForwardId::allocate(),
            spec: Arc::new(RwLock::new(spec)),
            settings,
            sessions: Arc::new(Sessions::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ForwardId {
        self.id
    }

    pub fn name(&self) -> String {
        self.spec.read().name.clone()
    }

    /// Current definition
    pub fn spec(&self) -> ForwardConfig {
        self.spec.read().clone()
    }

    /// Replace the definition. Returns true when the local address changed,
    /// which needs a listener restart to take effect.
    pub fn update(&self, spec: ForwardConfig) -> bool {
        let mut current = self.spec.write();
        let local_changed = current.local != spec.local;
        *current = spec;
        local_changed
    }

    /// Bind the local address and start accepting.
    ///
    /// Returns `Ok(false)` without doing anything when already started, when
    /// the local address is malformed, when its port is zero, or when `link`
    /// carries no dial queue.
    pub async fn start(&self, link: watch::Receiver<Option<DialQueue>>) -> Result<bool, ForwardError> {
        if self.listener.lock().is_some() {
            return Ok(false);
        }

        let spec = self.spec();
        let bind = match BindAddr::parse(&spec.local) {
            Ok(bind) => bind,
            Err(e) => {
                tracing::warn!("Forward '{}' not started: {}", spec.name, e);
                return Ok(false);
            }
        };
        if bind.is_disabled() {
            tracing::debug!("Forward '{}' is disabled (port 0)", spec.name);
            return Ok(false);
        }

        let socket = TcpListener::bind(bind.to_string())
            .await
            .map_err(|e| ForwardError::Bind {
                addr: bind.to_string(),
                source: e,
            })?;
        let local_addr = socket.local_addr().map_err(|e| ForwardError::Bind {
            addr: bind.to_string(),
            source: e,
        })?;

        // Checked under the slot lock: a host that detaches its session
        // clears the link before stopping forwards, so either we see the
        // cleared link here or the stop sees our listener.
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return Ok(false);
        }
        if link.borrow().is_none() {
            tracing::debug!("Forward '{}' not started: host not connected", spec.name);
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            socket,
            AcceptContext {
                spec: Arc::clone(&self.spec),
                sessions: Arc::clone(&self.sessions),
                link,
                relay: Relay::new(self.settings.read_poll, self.settings.relay_grace),
                cancel: cancel.clone(),
                settings: Arc::clone(&self.settings),
            },
        ));
        *slot = Some(Listener {
            local_addr,
            cancel,
            task,
        });

        tracing::info!("Forward '{}' listening on {} -> {}", spec.name, local_addr, spec.remote);
        Ok(true)
    }

    /// Stop accepting, cancel every live relay, wait for them to drain and
    /// release the socket. Does nothing when not started.
    pub async fn stop(&self) {
        let listener = self.listener.lock().take();
        let Some(listener) = listener else {
            return;
        };

        listener.cancel.cancel();
        let socket = match listener.task.await {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!("Accept loop for forward {} ended abnormally: {}", self.id, e);
                None
            }
        };

        self.sessions.cancel_all();
        while !self.sessions.is_empty() {
            tokio::time::sleep(self.settings.stop_poll).await;
        }

        drop(socket);
        tracing::info!("Forward '{}' stopped listening on {}", self.name(), listener.local_addr);
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Bound address while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|l| l.local_addr)
    }

    /// Number of live relays; connections still dialing are not counted
    pub fn session_count(&self) -> usize {
        self.sessions.relays.lock().active.len()
    }

    /// Accepted connections waiting on the host's dial queue
    pub fn pending_count(&self) -> usize {
        self.sessions.pending.len()
    }

    /// Peer address and bytes of each live relay
    pub fn session_bytes(&self) -> Vec<(SocketAddr, ByteCount)> {
        self.sessions
            .relays
            .lock()
            .active
            .values()
            .map(|h| (h.peer(), h.bytes()))
            .collect()
    }

    /// Cumulative bytes including live relays
    pub fn bytes(&self) -> ByteCount {
        self.sessions.bytes()
    }

    pub fn view(&self, host: HostId) -> ForwardView {
        let spec = self.spec();
        ForwardView {
            host,
            id: self.id,
            name: spec.name,
            local: spec.local,
            remote: spec.remote,
            listening: self.local_addr(),
            sessions: self.session_count(),
            bytes: self.bytes(),
        }
    }
}

struct AcceptContext {
    spec: Arc<RwLock<ForwardConfig>>,
    sessions: Arc<Sessions>,
    link: watch::Receiver<Option<DialQueue>>,
    relay: Relay,
    cancel: CancellationToken,
    settings: Arc<TunnelSettings>,
}

async fn accept_loop(socket: TcpListener, ctx: AcceptContext) -> TcpListener {
    loop {
        let (stream, peer) = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            accepted = socket.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(ctx.settings.stop_poll).await;
                    continue;
                }
            },
        };

        let queue = ctx.link.borrow().clone();
        let Some(queue) = queue else {
            tracing::debug!("Closing connection from {}: host not connected", peer);
            drop(stream);
            continue;
        };

        let remote_spec = ctx.spec.read().remote.clone();
        let remote = match RemoteAddr::parse(&remote_spec) {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!("Closing connection from {}: {}", peer, e);
                drop(stream);
                continue;
            }
        };

        let handle = ctx.sessions.accept(peer);
        tracing::debug!("Accepted {} for {} (relay {})", peer, remote, handle.id());
        tokio::spawn(serve_connection(
            stream,
            remote,
            queue,
            handle,
            ctx.relay,
            Arc::clone(&ctx.sessions),
        ));
    }

    socket
}

async fn serve_connection(
    local: TcpStream,
    remote: RemoteAddr,
    queue: DialQueue,
    handle: Arc<RelayHandle>,
    relay: Relay,
    sessions: Arc<Sessions>,
) {
    let channel = tokio::select! {
        _ = handle.cancelled() => None,
        dialed = queue.dial(remote.clone()) => match dialed {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::debug!("Closing connection from {}: {}", handle.peer(), e);
                None
            }
        },
    };

    if let Some(channel) = channel {
        sessions.activate(&handle);
        let bytes = relay.run(&handle, local, channel).await;
        tracing::debug!(
            "Relay {} {} <-> {} done: {} sent, {} received",
            handle.id(),
            handle.peer(),
            remote,
            bytes.sent,
            bytes.received
        );
    }

    sessions.finish(&handle);
}
