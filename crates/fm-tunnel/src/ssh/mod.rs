//! SSH session abstraction
//!
//! The engine only needs three things from an SSH session: open a
//! direct-tcpip channel, keep the session alive, and close. [`SessionConnector`]
//! turns a transport stream into such a session.

mod client;

pub use client::RusshConnector;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use fm_core::error::ConnectionError;
use fm_core::RemoteAddr;

/// Any duplex byte stream the relay can drive
pub trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// A remote channel returned by [`RemoteSession::open_channel`]
pub type BoxedStream = Box<dyn DuplexStream>;

/// Inputs to the SSH handshake
#[derive(Debug, Clone, Copy)]
pub struct HandshakeParams<'a> {
    /// SSH endpoint, for logging and error messages
    pub target: &'a RemoteAddr,
    /// Login user
    pub user: &'a str,
    /// Raw private key file contents
    pub key: &'a [u8],
    /// Where the key came from
    pub key_path: &'a Path,
    /// Pinned server key fingerprint, if any
    pub host_key: Option<&'a str>,
}

/// An authenticated SSH session
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Open a direct-tcpip channel to `remote`
    async fn open_channel(&self, remote: &RemoteAddr) -> Result<BoxedStream, ConnectionError>;

    /// Keepalive hook run by the host's ticker
    ///
    /// Sessions either send a no-op request here or, when their transport
    /// already pings the server, report whether the session is still up.
    async fn keepalive(&self) -> Result<(), ConnectionError>;

    /// Close the session
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Performs the SSH handshake over an established transport
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn handshake(
        &self,
        transport: TcpStream,
        params: HandshakeParams<'_>,
    ) -> Result<Arc<dyn RemoteSession>, ConnectionError>;
}
