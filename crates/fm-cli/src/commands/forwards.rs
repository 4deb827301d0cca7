//! Forward editing commands

use std::path::Path;

use anyhow::{Context, Result};

use fm_core::config::ForwardConfig;
use fm_core::{BindAddr, RemoteAddr};
use fm_tunnel::Removed;

use super::{open_registry, save_registry};
use crate::output::{print_success, print_warning};

/// Fields to change on an existing forward
#[derive(Debug, Default)]
pub struct ForwardEdit {
    pub name: Option<String>,
    pub local: Option<String>,
    pub remote: Option<String>,
}

fn check_forward(spec: &ForwardConfig) -> Result<()> {
    BindAddr::parse(&spec.local)
        .with_context(|| format!("Invalid local address '{}'", spec.local))?;
    RemoteAddr::parse(&spec.remote)
        .with_context(|| format!("Invalid remote address '{}'", spec.remote))?;
    Ok(())
}

/// Append a forward to a host. Missing fields come from the placeholder.
pub async fn add_forward_command(path: &Path, host: &str, edit: ForwardEdit) -> Result<()> {
    let placeholder = ForwardConfig::placeholder();
    let spec = ForwardConfig::new(
        edit.name.unwrap_or(placeholder.name),
        edit.local.unwrap_or(placeholder.local),
        edit.remote.unwrap_or(placeholder.remote),
    );
    check_forward(&spec)?;

    let registry = open_registry(path)?;
    let owner = registry
        .host_by_name(host)
        .with_context(|| format!("Unknown host '{}'", host))?;

    registry.add_forward(owner.id(), spec.clone()).await?;
    save_registry(path, &registry)?;

    print_success(&format!(
        "Added forward '{}' to '{}' ({} -> {})",
        spec.name, host, spec.local, spec.remote
    ));
    Ok(())
}

/// Change a forward's name or addresses
pub async fn edit_forward_command(
    path: &Path,
    host: &str,
    forward: &str,
    edit: ForwardEdit,
) -> Result<()> {
    let registry = open_registry(path)?;
    let (owner, target) = registry
        .forward_by_name(host, forward)
        .with_context(|| format!("Unknown forward '{}' on host '{}'", forward, host))?;

    let mut spec = target.spec();
    if let Some(name) = edit.name {
        spec.name = name;
    }
    if let Some(local) = edit.local {
        spec.local = local;
    }
    if let Some(remote) = edit.remote {
        spec.remote = remote;
    }
    check_forward(&spec)?;

    registry.edit_forward(owner.id(), target.id(), spec.clone()).await?;
    save_registry(path, &registry)?;

    print_success(&format!(
        "Updated forward '{}' on '{}' ({} -> {})",
        spec.name, host, spec.local, spec.remote
    ));
    Ok(())
}

/// Remove a forward; removing the last one removes the host
pub fn remove_forward_command(path: &Path, host: &str, forward: &str) -> Result<()> {
    let registry = open_registry(path)?;
    let (owner, target) = registry
        .forward_by_name(host, forward)
        .with_context(|| format!("Unknown forward '{}' on host '{}'", forward, host))?;

    let removed = registry.remove_forward(owner.id(), target.id())?;
    save_registry(path, &registry)?;

    match removed {
        Removed::Forward(_) => {
            print_success(&format!("Removed forward '{}' from '{}'", forward, host));
        }
        Removed::Host(_) => {
            print_warning(&format!("'{}' was the last forward of '{}'", forward, host));
            print_success(&format!("Removed host '{}'", host));
        }
    }
    Ok(())
}
