//! Registry of hosts and their forwards
//!
//! Every mutation swaps in a new host list, so a snapshot taken by an
//! observer stays consistent while edits happen.

use std::sync::Arc;

use parking_lot::RwLock;

use fm_core::config::{Config, ForwardConfig, HostConfig, TunnelSettings};
use fm_core::error::{HostError, RegistryError};
use fm_core::{ForwardId, HostId};

use crate::forward::Forward;
use crate::host::Host;
use crate::ssh::SessionConnector;
use crate::view::ListItem;

/// What a removal actually removed
pub enum Removed {
    Host(Arc<Host>),
    Forward(Arc<Forward>),
}

/// All known hosts, in display order
pub struct Registry {
    hosts: RwLock<Arc<Vec<Arc<Host>>>>,
    settings: Arc<TunnelSettings>,
    connector: Arc<dyn SessionConnector>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(settings: TunnelSettings, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            hosts: RwLock::new(Arc::new(Vec::new())),
            settings: Arc::new(settings),
            connector,
        }
    }

    /// Build hosts and forwards from a loaded configuration
    pub fn from_config(config: &Config, connector: Arc<dyn SessionConnector>) -> Self {
        let registry = Self::new(config.tunnel.clone(), connector);
        for host in &config.ssh_hosts {
            registry.add_host(host.clone());
        }
        registry
    }

    /// Current hosts and forwards as a saveable configuration
    pub fn to_config(&self) -> Config {
        Config {
            ssh_hosts: self.hosts().iter().map(|h| h.to_config()).collect(),
            tunnel: TunnelSettings::clone(&self.settings),
        }
    }

    pub fn settings(&self) -> &TunnelSettings {
        &self.settings
    }

    /// Snapshot of the host list
    pub fn hosts(&self) -> Arc<Vec<Arc<Host>>> {
        Arc::clone(&self.hosts.read())
    }

    pub fn host(&self, id: HostId) -> Option<Arc<Host>> {
        self.hosts().iter().find(|h| h.id() == id).cloned()
    }

    pub fn host_by_name(&self, name: &str) -> Option<Arc<Host>> {
        self.hosts().iter().find(|h| h.name() == name).cloned()
    }

    /// Look up a forward by host and forward name
    pub fn forward_by_name(&self, host: &str, forward: &str) -> Option<(Arc<Host>, Arc<Forward>)> {
        let host = self.host_by_name(host)?;
        let forward = host.forwards().iter().find(|f| f.name() == forward).cloned()?;
        Some((host, forward))
    }

    /// Append a host; always allowed
    pub fn add_host(&self, config: HostConfig) -> Arc<Host> {
        let host = Host::new(config, Arc::clone(&self.settings), Arc::clone(&self.connector));

        let mut hosts = self.hosts.write();
        let mut next = Vec::clone(&hosts);
        next.push(Arc::clone(&host));
        *hosts = Arc::new(next);

        tracing::debug!("Added host '{}' ({})", host.name(), host.id());
        host
    }

    /// Append a forward to a host; starts listening if the host is connected
    pub async fn add_forward(&self, host: HostId, spec: ForwardConfig) -> Result<Arc<Forward>, RegistryError> {
        let host = self
            .host(host)
            .ok_or_else(|| RegistryError::HostNotFound(host.to_string()))?;
        Ok(host.add_forward(spec).await)
    }

    /// Remove a host. Rejected unless it is `disconnected`.
    pub fn remove_host(&self, id: HostId) -> Result<Arc<Host>, RegistryError> {
        let mut hosts = self.hosts.write();
        let Some(index) = hosts.iter().position(|h| h.id() == id) else {
            return Err(RegistryError::HostNotFound(id.to_string()));
        };

        // Retiring checks the status under the host's own lock, so a
        // concurrent connect either lands first or is refused
        if let Err(status) = hosts[index].retire() {
            return Err(RegistryError::HostBusy {
                host: hosts[index].name(),
                status,
            });
        }

        let mut next = Vec::clone(&hosts);
        let removed = next.remove(index);
        *hosts = Arc::new(next);

        tracing::debug!("Removed host '{}' ({})", removed.name(), removed.id());
        Ok(removed)
    }

    /// Remove a forward. Removing a host's last forward removes the host,
    /// under the same rule as [`Registry::remove_host`].
    pub fn remove_forward(&self, host: HostId, forward: ForwardId) -> Result<Removed, RegistryError> {
        let owner = self
            .host(host)
            .ok_or_else(|| RegistryError::HostNotFound(host.to_string()))?;

        let forwards = owner.forwards();
        if !forwards.iter().any(|f| f.id() == forward) {
            return Err(RegistryError::ForwardNotFound(forward.to_string()));
        }
        if forwards.len() == 1 {
            return self.remove_host(host).map(Removed::Host);
        }

        owner
            .remove_forward(forward)
            .map(Removed::Forward)
            .map_err(|_| RegistryError::ForwardNotFound(forward.to_string()))
    }

    /// Change a forward's definition, restarting its listener when the
    /// local address moved
    pub async fn edit_forward(
        &self,
        host: HostId,
        forward: ForwardId,
        spec: ForwardConfig,
    ) -> Result<(), RegistryError> {
        let owner = self
            .host(host)
            .ok_or_else(|| RegistryError::HostNotFound(host.to_string()))?;
        owner
            .edit_forward(forward, spec)
            .await
            .map_err(|e| match e {
                HostError::ForwardNotFound(id) => RegistryError::ForwardNotFound(id),
                HostError::InvalidTransition { host, status, .. } => {
                    RegistryError::HostBusy { host, status }
                }
                HostError::Retired(name) => RegistryError::HostNotFound(name),
            })
    }

    /// Rows for a host/forward listing: each host followed by its forwards
    pub fn items(&self) -> Vec<ListItem> {
        let mut items = Vec::new();
        for host in self.hosts().iter() {
            items.push(ListItem::Host(host.view()));
            for forward in host.forwards().iter() {
                items.push(ListItem::Forward(forward.view(host.id())));
            }
        }
        items
    }
}
