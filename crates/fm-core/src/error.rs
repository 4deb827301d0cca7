//! Core error types for fwdmng

use std::path::PathBuf;
use thiserror::Error;

use crate::types::HostStatus;

/// Errors raised while parsing `host:port` strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// No `:port` separator
    #[error("Missing port in address '{0}'")]
    MissingPort(String),

    /// Port is not a number in range
    #[error("Invalid port in address '{0}'")]
    InvalidPort(String),

    /// Host part is empty where one is required
    #[error("Missing host in address '{0}'")]
    MissingHost(String),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Private key file could not be read
    #[error("Private key not readable at {path}: {source}")]
    KeyUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Private key could not be parsed
    #[error("Private key at {path} could not be parsed: {message}")]
    KeyInvalid { path: PathBuf, message: String },

    /// TCP dial to the SSH endpoint failed
    #[error("Transport dial to {target} failed: {message}")]
    Transport { target: String, message: String },

    /// The HTTP CONNECT proxy refused or broke the tunnel
    #[error("Proxy {proxy} failed: {message}")]
    Proxy { proxy: String, message: String },

    /// The dial or handshake did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// SSH handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Authentication was rejected by the server
    #[error("Authentication rejected for user {0}")]
    AuthRejected(String),

    /// Server host key does not match the pinned fingerprint
    #[error("Host key mismatch: expected {expected}, got {actual}")]
    HostKeyMismatch { expected: String, actual: String },

    /// Request on an established session failed
    #[error("Session error: {0}")]
    Session(String),
}

/// Errors delivered to a caller waiting on a remote dial
#[derive(Error, Debug)]
pub enum DialError {
    /// The host has no live session
    #[error("Host is not connected")]
    NotConnected,

    /// The dial queue is gone (host disconnected while waiting)
    #[error("Dial queue closed")]
    QueueClosed,

    /// Opening the remote channel failed
    #[error("Channel to {remote} failed: {message}")]
    ChannelFailed { remote: String, message: String },

    /// Opening the remote channel took too long
    #[error("Channel to {remote} timed out after {timeout:?}")]
    Timeout {
        remote: String,
        timeout: std::time::Duration,
    },
}

/// Host state machine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Requested operation is not valid in the current state
    #[error("Cannot {operation} host '{host}' while {status}")]
    InvalidTransition {
        host: String,
        operation: &'static str,
        status: HostStatus,
    },

    /// Forward does not belong to this host
    #[error("Forward not found on host '{0}'")]
    ForwardNotFound(String),

    /// Host was removed from its registry
    #[error("Host '{0}' has been removed")]
    Retired(String),
}

/// Forward listener errors
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Binding the local socket failed
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Registry mutation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Host not present
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// Forward not present
    #[error("Forward not found: {0}")]
    ForwardNotFound(String),

    /// Host must be disconnected first
    #[error("Host '{host}' is {status}; disconnect it first")]
    HostBusy { host: String, status: HostStatus },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
