//! Read-only snapshots for observers

use std::net::SocketAddr;

use fm_core::{ByteCount, ForwardId, HostId, HostStatus};

/// Snapshot of a host row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostView {
    pub id: HostId,
    pub name: String,
    pub hostname: String,
    pub user: String,
    pub status: HostStatus,
    pub forwards: usize,
}

/// Snapshot of a forward row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardView {
    /// Owning host
    pub host: HostId,
    pub id: ForwardId,
    pub name: String,
    pub local: String,
    pub remote: String,
    /// Bound address while the listener is up
    pub listening: Option<SocketAddr>,
    /// Live relays; connections still waiting for a channel are excluded
    pub sessions: usize,
    pub bytes: ByteCount,
}

/// One row of the host/forward listing, hosts followed by their forwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    Host(HostView),
    Forward(ForwardView),
}

impl ListItem {
    /// Host the row belongs to
    pub fn host_id(&self) -> HostId {
        match self {
            ListItem::Host(host) => host.id,
            ListItem::Forward(forward) => forward.host,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ListItem::Host(host) => &host.name,
            ListItem::Forward(forward) => &forward.name,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, ListItem::Host(_))
    }
}
