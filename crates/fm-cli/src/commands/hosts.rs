//! Host editing commands

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use fm_core::config::HostConfig;
use fm_core::RemoteAddr;
use fm_tunnel::host::DEFAULT_SSH_PORT;

use super::{open_registry, save_registry};
use crate::output::{print_info, print_success};

/// Connection fields to change on an existing host
#[derive(Debug, Default)]
pub struct HostEdit {
    pub rename: Option<String>,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub privkey: Option<PathBuf>,
    /// `Some("")` clears the proxy
    pub proxy: Option<String>,
    /// `Some("")` clears the pin
    pub host_key: Option<String>,
}

fn check_hostname(hostname: &str) -> Result<()> {
    RemoteAddr::parse_with_default_port(hostname, DEFAULT_SSH_PORT)
        .with_context(|| format!("Invalid hostname '{}'", hostname))?;
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Add a host. It starts with one disabled placeholder forward.
pub fn add_host_command(path: &Path, host: HostConfig) -> Result<()> {
    check_hostname(&host.hostname)?;

    let registry = open_registry(path)?;
    if registry.host_by_name(&host.name).is_some() {
        bail!("Host '{}' already exists", host.name);
    }

    let name = host.name.clone();
    registry.add_host(host);
    save_registry(path, &registry)?;

    print_success(&format!("Added host '{}'", name));
    print_info("Edit its placeholder forward with 'fwdmng edit-forward'");
    Ok(())
}

/// Change connection fields of a host
pub fn edit_host_command(path: &Path, name: &str, edit: HostEdit) -> Result<()> {
    let registry = open_registry(path)?;
    let host = registry
        .host_by_name(name)
        .with_context(|| format!("Unknown host '{}'", name))?;

    let mut config = host.to_config();
    if let Some(rename) = edit.rename {
        if rename != name && registry.host_by_name(&rename).is_some() {
            bail!("Host '{}' already exists", rename);
        }
        config.name = rename;
    }
    if let Some(hostname) = edit.hostname {
        check_hostname(&hostname)?;
        config.hostname = hostname;
    }
    if let Some(user) = edit.user {
        config.user = user;
    }
    if let Some(privkey) = edit.privkey {
        config.privkey = privkey;
    }
    if let Some(proxy) = edit.proxy {
        config.proxy = non_empty(proxy);
    }
    if let Some(host_key) = edit.host_key {
        config.host_key = non_empty(host_key);
    }

    let new_name = config.name.clone();
    host.update_target(config);
    save_registry(path, &registry)?;

    print_success(&format!("Updated host '{}'", new_name));
    Ok(())
}

/// Remove a host and all of its forwards
pub fn remove_host_command(path: &Path, name: &str) -> Result<()> {
    let registry = open_registry(path)?;
    let host = registry
        .host_by_name(name)
        .with_context(|| format!("Unknown host '{}'", name))?;

    registry.remove_host(host.id())?;
    save_registry(path, &registry)?;

    print_success(&format!("Removed host '{}'", name));
    Ok(())
}
