//! Timing and capacity knobs for the tunnel engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Tunnel engine settings, stored under `[tunnel]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Pending dial requests a host will queue before callers wait
    pub dial_queue_capacity: usize,

    /// Read deadline used by relay connections to re-check cancellation
    #[serde(with = "duration_secs")]
    pub read_poll: Duration,

    /// How long a finished relay waits for the other direction to stop
    #[serde(with = "duration_secs")]
    pub relay_grace: Duration,

    /// Time spent in `failure` before returning to `disconnected`
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,

    /// Delay after teardown so in-flight relays observe cancellation
    #[serde(with = "duration_secs")]
    pub settle: Duration,

    /// Keepalive ticker period
    #[serde(with = "duration_secs")]
    pub keepalive_tick: Duration,

    /// Minimum time between two keepalive requests
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Upper bound on waiting for the SSH session to close
    #[serde(with = "duration_secs")]
    pub close_timeout: Duration,

    /// Upper bound on transport dial plus handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Upper bound on opening one remote channel; 0 waits forever
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,

    /// Poll period while a stopping listener drains its sessions
    #[serde(with = "duration_millis")]
    pub stop_poll: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            dial_queue_capacity: 32,
            read_poll: Duration::from_secs(1),
            relay_grace: Duration::from_secs(1),
            cooldown: Duration::from_secs(5),
            settle: Duration::from_secs(1),
            keepalive_tick: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(60),
            close_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(30),
            stop_poll: Duration::from_millis(100),
        }
    }
}

impl TunnelSettings {
    /// Per-dial timeout, `None` when disabled
    pub fn dial_timeout(&self) -> Option<Duration> {
        if self.dial_timeout.is_zero() {
            None
        } else {
            Some(self.dial_timeout)
        }
    }
}
