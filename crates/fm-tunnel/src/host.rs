//! Host connection state machine
//!
//! ```text
//! disconnected ──connect──▶ connecting ──▶ connected ──disconnect──▶ disconnecting
//!      ▲                        │                                        │
//!      └──── cooldown ──── failure ◀┘                                    │
//!      └─────────────────────────────── settle ◀─────────────────────────┘
//! ```
//!
//! A host holds its SSH session and dial queue only while `connected`; both
//! are attached and detached in the same step as the status change. Forward
//! listeners follow the link: they are started once the link is published
//! and stopped after it is cleared.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use fm_core::config::{ForwardConfig, HostConfig, TunnelSettings};
use fm_core::error::{ConnectionError, HostError};
use fm_core::{ForwardId, HostId, HostStatus, RemoteAddr};

use crate::dial::{spawn_dial_service, DialQueue};
use crate::forward::Forward;
use crate::keepalive::Keepalive;
use crate::ssh::{HandshakeParams, RemoteSession, SessionConnector};
use crate::transport;
use crate::view::HostView;

/// Port used when `Hostname` has none
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Everything that exists only while connected
struct SessionLink {
    session: Arc<dyn RemoteSession>,
    /// Stops the dial service and keepalive ticker
    cancel: CancellationToken,
}

struct HostState {
    status: HostStatus,
    link: Option<SessionLink>,
    /// Removed from its registry; never connects again
    retired: bool,
}

/// One status change, delivered in the order it was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HostStatus,
    pub to: HostStatus,
}

/// One SSH host and its forwards
pub struct Host {
    id: HostId,
    /// Connection fields; forwards live in `forwards`
    target: RwLock<HostConfig>,
    settings: Arc<TunnelSettings>,
    connector: Arc<dyn SessionConnector>,
    state: Mutex<HostState>,
    status_tx: watch::Sender<HostStatus>,
    transition_txs: Mutex<Vec<mpsc::UnboundedSender<Transition>>>,
    link_tx: watch::Sender<Option<DialQueue>>,
    forwards: RwLock<Arc<Vec<Arc<Forward>>>>,
}

impl Host {
    /// Build a disconnected host from its configuration
    pub fn new(
        config: HostConfig,
        settings: Arc<TunnelSettings>,
        connector: Arc<dyn SessionConnector>,
    ) -> Arc<Self> {
        let mut target = config;
        let forwards = std::mem::take(&mut target.fwds)
            .into_iter()
            .map(|spec| Arc::new(Forward::new(spec, Arc::clone(&settings))))
            .collect();

        Arc::new(Self {
            id: HostId::allocate(),
            target: RwLock::new(target),
            settings,
            connector,
            state: Mutex::new(HostState {
                status: HostStatus::Disconnected,
                link: None,
                retired: false,
            }),
            status_tx: watch::channel(HostStatus::Disconnected).0,
            transition_txs: Mutex::new(Vec::new()),
            link_tx: watch::channel(None).0,
            forwards: RwLock::new(Arc::new(forwards)),
        })
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> String {
        self.target.read().name.clone()
    }

    pub fn status(&self) -> HostStatus {
        self.state.lock().status
    }

    /// Watch the latest status; intermediate values may be skipped
    pub fn subscribe(&self) -> watch::Receiver<HostStatus> {
        self.status_tx.subscribe()
    }

    /// Every status change from now on, none skipped
    pub fn transitions(&self) -> mpsc::UnboundedReceiver<Transition> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.transition_txs.lock().push(tx);
        rx
    }

    /// Mark the host as removed. Fails with the current status unless
    /// `disconnected`; once retired, `connect` is refused.
    pub fn retire(&self) -> Result<(), HostStatus> {
        let mut state = self.state.lock();
        if state.status != HostStatus::Disconnected {
            return Err(state.status);
        }
        state.retired = true;
        Ok(())
    }

    /// Status and whether a session is attached, read atomically
    pub fn status_and_link(&self) -> (HostStatus, bool) {
        let state = self.state.lock();
        (state.status, state.link.is_some())
    }

    /// Start connecting. `on_done` runs once the attempt settles in
    /// `connected` or `failure`.
    pub fn connect<F>(self: &Arc<Self>, on_done: F) -> Result<(), HostError>
    where
        F: FnOnce(HostStatus) + Send + 'static,
    {
        self.begin("connect", HostStatus::Disconnected, HostStatus::Connecting)?;

        let host = Arc::clone(self);
        tokio::spawn(async move { host.run_connect(on_done).await });
        Ok(())
    }

    /// Start disconnecting. `on_done` runs once back in `disconnected`.
    pub fn disconnect<F>(self: &Arc<Self>, on_done: F) -> Result<(), HostError>
    where
        F: FnOnce(HostStatus) + Send + 'static,
    {
        let link = {
            let mut state = self.state.lock();
            if state.status != HostStatus::Connected {
                return Err(self.invalid("disconnect", state.status));
            }
            self.publish(&mut state, HostStatus::Disconnecting);
            self.link_tx.send_replace(None);
            state.link.take()
        };

        let host = Arc::clone(self);
        tokio::spawn(async move {
            host.run_disconnect(link).await;
            on_done(HostStatus::Disconnected);
        });
        Ok(())
    }

    fn begin(
        &self,
        operation: &'static str,
        from: HostStatus,
        to: HostStatus,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.retired {
            return Err(HostError::Retired(self.name()));
        }
        if state.status != from {
            return Err(self.invalid(operation, state.status));
        }
        self.publish(&mut state, to);
        Ok(())
    }

    fn invalid(&self, operation: &'static str, status: HostStatus) -> HostError {
        HostError::InvalidTransition {
            host: self.name(),
            operation,
            status,
        }
    }

    /// Set and broadcast a status; caller holds the state lock
    fn publish(&self, state: &mut HostState, next: HostStatus) {
        debug_assert!(state.status.can_transition_to(next));
        tracing::info!("Host '{}': {} -> {}", self.name(), state.status, next);
        let change = Transition {
            from: state.status,
            to: next,
        };
        state.status = next;
        self.status_tx.send_replace(next);
        self.transition_txs.lock().retain(|tx| tx.send(change).is_ok());
    }

    fn transition(&self, from: HostStatus, to: HostStatus) {
        let mut state = self.state.lock();
        if state.status == from {
            self.publish(&mut state, to);
        }
    }

    async fn run_connect<F>(self: Arc<Self>, on_done: F)
    where
        F: FnOnce(HostStatus) + Send + 'static,
    {
        let limit = self.settings.connect_timeout;
        let established = tokio::time::timeout(limit, self.establish())
            .await
            .unwrap_or(Err(ConnectionError::Timeout(limit)));

        match established {
            Ok(session) => {
                self.attach(session);
                self.start_forwards().await;
                on_done(HostStatus::Connected);
            }
            Err(e) => {
                tracing::error!("Host '{}' failed to connect: {}", self.name(), e);
                self.transition(HostStatus::Connecting, HostStatus::Failure);
                on_done(HostStatus::Failure);

                tokio::time::sleep(self.settings.cooldown).await;
                self.transition(HostStatus::Failure, HostStatus::Disconnected);
            }
        }
    }

    /// Read the key, dial the transport and run the handshake
    async fn establish(&self) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
        let target = self.target.read().clone();

        let key = tokio::fs::read(&target.privkey)
            .await
            .map_err(|e| ConnectionError::KeyUnreadable {
                path: target.privkey.clone(),
                source: e,
            })?;

        let endpoint = RemoteAddr::parse_with_default_port(&target.hostname, DEFAULT_SSH_PORT)
            .map_err(|e| ConnectionError::Transport {
                target: target.hostname.clone(),
                message: e.to_string(),
            })?;

        let transport = transport::dial(&endpoint, target.proxy()).await?;

        self.connector
            .handshake(
                transport,
                HandshakeParams {
                    target: &endpoint,
                    user: &target.user,
                    key: &key,
                    key_path: &target.privkey,
                    host_key: target.host_key(),
                },
            )
            .await
    }

    /// Store the session, open the dial queue and go `connected`
    fn attach(&self, session: Arc<dyn RemoteSession>) {
        let name = self.name();
        let cancel = CancellationToken::new();
        let (queue, requests) = DialQueue::channel(self.settings.dial_queue_capacity);

        spawn_dial_service(
            name.clone(),
            Arc::clone(&session),
            requests,
            self.settings.dial_timeout(),
            cancel.child_token(),
        );
        Keepalive::new(self.settings.keepalive_tick, self.settings.keepalive_interval).spawn(
            name,
            Arc::clone(&session),
            cancel.child_token(),
        );

        let mut state = self.state.lock();
        state.link = Some(SessionLink { session, cancel });
        self.publish(&mut state, HostStatus::Connected);
        self.link_tx.send_replace(Some(queue));
    }

    async fn start_forwards(&self) {
        for forward in self.forwards().iter() {
            self.start_forward(forward).await;
        }
    }

    async fn start_forward(&self, forward: &Forward) {
        if let Err(e) = forward.start(self.link_tx.subscribe()).await {
            tracing::warn!("Forward '{}' on host '{}' not started: {}", forward.name(), self.name(), e);
        }
    }

    async fn run_disconnect(&self, link: Option<SessionLink>) {
        if let Some(link) = link {
            link.cancel.cancel();
            match tokio::time::timeout(self.settings.close_timeout, link.session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Closing session for '{}': {}", self.name(), e),
                Err(_) => tracing::warn!(
                    "Session for '{}' did not close within {:?}",
                    self.name(),
                    self.settings.close_timeout
                ),
            }
        }

        let forwards = self.forwards();
        join_all(forwards.iter().map(|forward| forward.stop())).await;

        tokio::time::sleep(self.settings.settle).await;
        self.transition(HostStatus::Disconnecting, HostStatus::Disconnected);
    }

    /// Snapshot of this host's forwards
    pub fn forwards(&self) -> Arc<Vec<Arc<Forward>>> {
        Arc::clone(&self.forwards.read())
    }

    pub fn forward(&self, id: ForwardId) -> Option<Arc<Forward>> {
        self.forwards().iter().find(|f| f.id() == id).cloned()
    }

    /// Append a forward; it starts listening right away when connected
    pub async fn add_forward(&self, spec: ForwardConfig) -> Arc<Forward> {
        let forward = Arc::new(Forward::new(spec, Arc::clone(&self.settings)));
        {
            let mut forwards = self.forwards.write();
            let mut next = Vec::clone(&forwards);
            next.push(Arc::clone(&forward));
            *forwards = Arc::new(next);
        }
        self.start_forward(&forward).await;
        forward
    }

    /// Detach a forward; an active listener is stopped in the background
    pub fn remove_forward(&self, id: ForwardId) -> Result<Arc<Forward>, HostError> {
        let removed = {
            let mut forwards = self.forwards.write();
            let Some(index) = forwards.iter().position(|f| f.id() == id) else {
                return Err(HostError::ForwardNotFound(id.to_string()));
            };
            let mut next = Vec::clone(&forwards);
            let removed = next.remove(index);
            *forwards = Arc::new(next);
            removed
        };

        if removed.is_listening() {
            let forward = Arc::clone(&removed);
            tokio::spawn(async move { forward.stop().await });
        }
        Ok(removed)
    }

    /// Change a forward's definition. A new local address restarts its
    /// listener; a new remote applies to the next accepted connection.
    pub async fn edit_forward(&self, id: ForwardId, spec: ForwardConfig) -> Result<(), HostError> {
        let forward = self
            .forward(id)
            .ok_or_else(|| HostError::ForwardNotFound(id.to_string()))?;

        if forward.update(spec) {
            forward.stop().await;
            self.start_forward(&forward).await;
        }
        Ok(())
    }

    /// Replace connection fields; takes effect on the next connect
    pub fn update_target(&self, config: HostConfig) {
        let mut target = self.target.write();
        *target = HostConfig {
            fwds: Vec::new(),
            ..config
        };
    }

    /// Current definition including forwards
    pub fn to_config(&self) -> HostConfig {
        let mut config = self.target.read().clone();
        config.fwds = self.forwards().iter().map(|f| f.spec()).collect();
        config
    }

    pub fn view(&self) -> HostView {
        let target = self.target.read().clone();
        HostView {
            id: self.id,
            name: target.name,
            hostname: target.hostname,
            user: target.user,
            status: self.status(),
            forwards: self.forwards().len(),
        }
    }
}
