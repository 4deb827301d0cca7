//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FORWARD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(u64);

impl HostId {
    /// Allocate a fresh host ID
    pub fn allocate() -> Self {
        Self(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Process-unique identifier for a forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForwardId(u64);

impl ForwardId {
    /// Allocate a fresh forward ID
    pub fn allocate() -> Self {
        Self(NEXT_FORWARD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ForwardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Connection status for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostStatus {
    /// Idle, no session
    Disconnected,
    /// Key load, dial and handshake in progress
    Connecting,
    /// Session established, forwards listening
    Connected,
    /// Tearing down the session and listeners
    Disconnecting,
    /// Last connect attempt failed; cooling down
    Failure,
}

impl HostStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: HostStatus) -> bool {
        use HostStatus::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failure)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
                | (Failure, Disconnected)
        )
    }

    /// True while a connect or disconnect sequence is running
    pub fn is_transitioning(self) -> bool {
        matches!(
            self,
            HostStatus::Connecting | HostStatus::Disconnecting | HostStatus::Failure
        )
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostStatus::Disconnected => write!(f, "disconnected"),
            HostStatus::Connecting => write!(f, "connecting"),
            HostStatus::Connected => write!(f, "connected"),
            HostStatus::Disconnecting => write!(f, "disconnecting"),
            HostStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Byte totals for a relay or a forward
///
/// `sent` counts bytes read from the local client (local → remote),
/// `received` counts bytes read from the remote channel (remote → local).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCount {
    pub sent: u64,
    pub received: u64,
}

impl ByteCount {
    pub fn new(sent: u64, received: u64) -> Self {
        Self { sent, received }
    }

    pub fn total(&self) -> u64 {
        self.sent + self.received
    }
}

impl Add for ByteCount {
    type Output = ByteCount;

    fn add(self, rhs: ByteCount) -> ByteCount {
        ByteCount {
            sent: self.sent + rhs.sent,
            received: self.received + rhs.received,
        }
    }
}

impl AddAssign for ByteCount {
    fn add_assign(&mut self, rhs: ByteCount) {
        self.sent += rhs.sent;
        self.received += rhs.received;
    }
}
