//! Host and forward definitions as persisted on disk

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::TunnelSettings;

/// Root of the configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SSH hosts, in display order
    #[serde(rename = "SSHHosts", default)]
    pub ssh_hosts: Vec<HostConfig>,

    /// Engine timings; omitted tables fall back to defaults
    #[serde(default)]
    pub tunnel: TunnelSettings,
}

impl Config {
    /// Find a host by name
    pub fn host(&self, name: &str) -> Option<&HostConfig> {
        self.ssh_hosts.iter().find(|h| h.name == name)
    }
}

/// One SSH host and its forwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// Display name
    pub name: String,

    /// SSH endpoint, `host[:port]`
    pub hostname: String,

    /// Login user
    #[serde(default = "default_user")]
    pub user: String,

    /// Path to the private key file
    pub privkey: PathBuf,

    /// HTTP CONNECT proxy used to reach `hostname`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Pinned server key fingerprint (`SHA256:...`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key: Option<String>,

    /// Forward definitions
    #[serde(default)]
    pub fwds: Vec<ForwardConfig>,
}

fn default_user() -> String {
    whoami::username()
}

impl HostConfig {
    /// Create a host with no forwards
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        user: impl Into<String>,
        privkey: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            user: user.into(),
            privkey: privkey.into(),
            proxy: None,
            host_key: None,
            fwds: Vec::new(),
        }
    }

    /// Template used for a freshly created host: one disabled forward
    pub fn template() -> Self {
        let mut host = Self::new("new name", "new hostname", default_user(), "new privkey");
        host.fwds.push(ForwardConfig::placeholder());
        host
    }

    /// Proxy address, treating an empty string as unset
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// Pinned fingerprint, treating an empty string as unset
    pub fn host_key(&self) -> Option<&str> {
        self.host_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_forward(mut self, fwd: ForwardConfig) -> Self {
        self.fwds.push(fwd);
        self
    }
}

/// One local → remote forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForwardConfig {
    /// Label
    pub name: String,

    /// Local bind address; port 0 disables the forward
    pub local: String,

    /// Remote target reached through the SSH session
    pub remote: String,
}

impl ForwardConfig {
    pub fn new(
        name: impl Into<String>,
        local: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            local: local.into(),
            remote: remote.into(),
        }
    }

    /// Disabled forward appended by "add forward"
    pub fn placeholder() -> Self {
        Self::new("unknown", ":0", "127.0.0.1:0")
    }
}
