//! Session keepalive ticker
//!
//! Calls [`RemoteSession::keepalive`] once per `interval` while a host is
//! connected. Sessions whose transport pings on its own (russh) treat the
//! call as a liveness check, so a dead session shows up in the log.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ssh::RemoteSession;

/// Keepalive cadence for a connected host
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    /// How often to check
    pub tick: Duration,
    /// Minimum gap between two requests
    pub interval: Duration,
}

impl Keepalive {
    pub fn new(tick: Duration, interval: Duration) -> Self {
        Self { tick, interval }
    }

    /// Tick until `cancel` fires, sending a keepalive whenever more than
    /// `interval` has passed since the last one.
    pub fn spawn(
        self,
        host: String,
        session: Arc<dyn RemoteSession>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if last.elapsed() <= self.interval {
                    continue;
                }

                tracing::trace!("Sending keepalive to {}", host);
                if let Err(e) = session.keepalive().await {
                    tracing::warn!("Keepalive to {} failed: {}", host, e);
                }
                last = Instant::now();
            }

            tracing::debug!("Keepalive stopped for {}", host);
        })
    }
}
