//! russh-backed session connector

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client::{self, Config, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use tokio::net::TcpStream;

use fm_core::error::ConnectionError;
use fm_core::RemoteAddr;

use super::{BoxedStream, HandshakeParams, RemoteSession, SessionConnector};

/// Originator reported in direct-tcpip requests
const ORIGINATOR_ADDRESS: &str = "127.0.0.1";

/// Unanswered keepalives before russh drops the session
const KEEPALIVE_MAX: usize = 3;

/// Connector that speaks SSH through russh
///
/// Protocol keepalives are sent by russh's session loop, which pings the
/// server after `keepalive_interval` of silence and closes the session once
/// [`KEEPALIVE_MAX`] go unanswered.
pub struct RusshConnector {
    config: Arc<Config>,
}

impl RusshConnector {
    pub fn new(keepalive_interval: Duration) -> Self {
        Self::with_config(client_config(keepalive_interval))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Client configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn client_config(keepalive_interval: Duration) -> Config {
    Config {
        keepalive_interval: (!keepalive_interval.is_zero()).then_some(keepalive_interval),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    }
}

#[async_trait]
impl SessionConnector for RusshConnector {
    async fn handshake(
        &self,
        transport: TcpStream,
        params: HandshakeParams<'_>,
    ) -> Result<Arc<dyn RemoteSession>, ConnectionError> {
        let key_text =
            std::str::from_utf8(params.key).map_err(|e| ConnectionError::KeyInvalid {
                path: params.key_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let key = russh_keys::decode_secret_key(key_text, None).map_err(|e| {
            ConnectionError::KeyInvalid {
                path: params.key_path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

        let seen_key = Arc::new(Mutex::new(None));
        let handler = ClientHandler {
            target: params.target.to_string(),
            expected_host_key: params.host_key.map(normalize_fingerprint),
            seen_key: Arc::clone(&seen_key),
        };

        tracing::debug!("SSH handshake with {}", params.target);
        let mut handle = client::connect_stream(Arc::clone(&self.config), transport, handler)
            .await
            .map_err(|e| {
                if let Some(expected) = params.host_key.map(normalize_fingerprint) {
                    if let Some(actual) = seen_key.lock().clone() {
                        if actual != expected {
                            return ConnectionError::HostKeyMismatch { expected, actual };
                        }
                    }
                }
                ConnectionError::Handshake(e.to_string())
            })?;

        tracing::debug!("Authenticating as user '{}'", params.user);
        let authenticated = handle
            .authenticate_publickey(params.user, Arc::new(key))
            .await
            .map_err(|e| ConnectionError::Handshake(format!("Authentication error: {}", e)))?;

        if !authenticated {
            return Err(ConnectionError::AuthRejected(params.user.to_string()));
        }

        Ok(Arc::new(RusshSession {
            handle,
            target: params.target.to_string(),
        }))
    }
}

/// `SHA256:abc=` and `abc=` name the same key
fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .trim()
        .trim_start_matches("SHA256:")
        .to_string()
}

/// Live russh session
struct RusshSession {
    handle: Handle<ClientHandler>,
    target: String,
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn open_channel(&self, remote: &RemoteAddr) -> Result<BoxedStream, ConnectionError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                remote.host.clone(),
                u32::from(remote.port),
                ORIGINATOR_ADDRESS,
                0,
            )
            .await
            .map_err(|e| ConnectionError::Session(format!("direct-tcpip to {}: {}", remote, e)))?;

        Ok(Box::new(channel.into_stream()))
    }

    /// russh sends the keepalive requests itself; this reports whether its
    /// session loop is still running.
    async fn keepalive(&self) -> Result<(), ConnectionError> {
        if self.handle.is_closed() {
            return Err(ConnectionError::Session(format!(
                "session to {} closed",
                self.target
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(|e| ConnectionError::Session(format!("disconnect from {}: {}", self.target, e)))
    }
}

/// SSH client handler
struct ClientHandler {
    target: String,
    /// Pinned fingerprint without the `SHA256:` prefix
    expected_host_key: Option<String>,
    /// Fingerprint the server presented
    seen_key: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Verify the server's host key
    ///
    /// Without a pinned fingerprint any key is accepted. That is a known
    /// gap, so it is logged loudly with the fingerprint to pin.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        *self.seen_key.lock() = Some(fingerprint.clone());

        match &self.expected_host_key {
            Some(expected) if *expected == fingerprint => {
                tracing::debug!("Host key for {} matches pinned fingerprint", self.target);
                Ok(true)
            }
            Some(expected) => {
                tracing::error!(
                    "Host key for {} differs from pinned: expected SHA256:{}, got SHA256:{}",
                    self.target,
                    expected,
                    fingerprint
                );
                Ok(false)
            }
            None => {
                tracing::warn!(
                    "Accepting unverified host key SHA256:{} for {} (set HostKey to pin it)",
                    fingerprint,
                    self.target
                );
                Ok(true)
            }
        }
    }
}
