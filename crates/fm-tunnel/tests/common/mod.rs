//! Shared fixtures: an in-process SSH stand-in and loopback servers

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use fm_core::config::{ForwardConfig, HostConfig, TunnelSettings};
use fm_core::error::ConnectionError;
use fm_core::{HostStatus, RemoteAddr};
use fm_tunnel::ssh::HandshakeParams;
use fm_tunnel::{BoxedStream, Host, RemoteSession, SessionConnector};

pub const KEY_BYTES: &[u8] = b"-----BEGIN TEST KEY-----\nfake\n-----END TEST KEY-----\n";

/// Short timings so tests run in milliseconds
pub fn settings() -> TunnelSettings {
    TunnelSettings {
        dial_queue_capacity: 8,
        read_poll: Duration::from_millis(20),
        relay_grace: Duration::from_millis(100),
        cooldown: Duration::from_millis(100),
        settle: Duration::from_millis(20),
        keepalive_tick: Duration::from_millis(20),
        keepalive_interval: Duration::from_millis(50),
        close_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(2),
        dial_timeout: Duration::from_secs(2),
        stop_poll: Duration::from_millis(10),
    }
}

/// Session that opens channels as plain loopback TCP connections
#[derive(Default)]
pub struct FakeSession {
    pub channels: AtomicUsize,
    pub keepalives: AtomicUsize,
    pub closes: AtomicUsize,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn open_channel(&self, remote: &RemoteAddr) -> Result<BoxedStream, ConnectionError> {
        let stream = TcpStream::connect(remote.to_string())
            .await
            .map_err(|e| ConnectionError::Session(e.to_string()))?;
        self.channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(stream))
    }

    async fn keepalive(&self) -> Result<(), ConnectionError> {
        self.keepalives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that checks the key and hands out [`FakeSession`]s
#[derive(Default)]
pub struct FakeConnector {
    pub reject: bool,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    /// Transports are held so the endpoint sees a live connection
    transports: Mutex<Vec<TcpStream>>,
}

impl FakeConnector {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn last_session(&self) -> Arc<FakeSession> {
        Arc::clone(self.sessions.lock().last().expect("no session yet"))
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn handshake(
        &self,
        transport: TcpStream,
        params: HandshakeParams<'_>,
    ) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
        if self.reject || params.key != KEY_BYTES {
            return Err(ConnectionError::AuthRejected(params.user.to_string()));
        }
        self.transports.lock().push(transport);

        let session = Arc::new(FakeSession::default());
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

/// Stand-in SSH endpoint: accepts and holds connections
pub async fn ssh_endpoint() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    port
}

/// Echo server standing in for a remote target
pub async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.into_split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    port
}

/// Remote target that sends `reply` bytes, then reports how many bytes it
/// read before the client side closed.
pub async fn counting_server(reply: usize) -> (u16, tokio::sync::mpsc::UnboundedReceiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                stream.write_all(&vec![0x5a; reply]).await.unwrap();
                let mut sink = Vec::new();
                let _ = stream.read_to_end(&mut sink).await;
                let _ = tx.send(sink.len());
            });
        }
    });
    (port, rx)
}

/// Reserve a loopback port nobody is listening on
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn key_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(KEY_BYTES).unwrap();
    file
}

pub fn host_config(ssh_port: u16, key: &NamedTempFile) -> HostConfig {
    HostConfig::new("test", format!("127.0.0.1:{}", ssh_port), "ops", key.path())
}

pub fn forward_config(name: &str, local_port: u16, remote_port: u16) -> ForwardConfig {
    ForwardConfig::new(
        name,
        format!("127.0.0.1:{}", local_port),
        format!("127.0.0.1:{}", remote_port),
    )
}

/// Connect and wait for the attempt to settle
pub async fn connect(host: &Arc<Host>) -> HostStatus {
    let (tx, rx) = oneshot::channel();
    host.connect(move |status| {
        let _ = tx.send(status);
    })
    .unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("connect did not settle")
        .unwrap()
}

/// Disconnect and wait for `disconnected`
pub async fn disconnect(host: &Arc<Host>) -> HostStatus {
    let (tx, rx) = oneshot::channel();
    host.disconnect(move |status| {
        let _ = tx.send(status);
    })
    .unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("disconnect did not settle")
        .unwrap()
}

/// Wait until `check` holds, polling every 10 ms for up to 5 s
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}
