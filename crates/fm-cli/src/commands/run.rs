//! Run command: connect hosts and report until Ctrl-C

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::oneshot;

use fm_core::HostStatus;
use fm_tunnel::{Host, Registry};

use super::open_registry;
use crate::output::{format_items, print_error, print_info, print_success, print_warning};

/// Shortest accepted refresh period
const MIN_REFRESH: Duration = Duration::from_secs(1);

/// Connect the named hosts (all when `hosts` is empty), print a status
/// table every `refresh`, and disconnect everything on Ctrl-C.
pub async fn run_command(path: &Path, hosts: &[String], refresh: Duration) -> Result<()> {
    let registry = open_registry(path)?;
    let selected = select_hosts(&registry, hosts)?;
    if selected.is_empty() {
        print_warning("No hosts configured");
        return Ok(());
    }

    for host in &selected {
        let name = host.name();
        host.connect(move |status| match status {
            HostStatus::Connected => print_success(&format!("Connected to '{}'", name)),
            other => print_error(&format!("Connecting to '{}' ended in {}", name, other)),
        })?;
    }

    let mut ticker = tokio::time::interval(refresh.max(MIN_REFRESH));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = ticker.tick() => println!("{}", format_items(&registry.items())),
        }
    }

    print_info("Disconnecting...");
    join_all(selected.iter().map(shutdown_host)).await;
    print_success("All hosts disconnected");
    Ok(())
}

fn select_hosts(registry: &Registry, names: &[String]) -> Result<Vec<Arc<Host>>> {
    if names.is_empty() {
        return Ok(registry.hosts().iter().cloned().collect());
    }
    names
        .iter()
        .map(|name| {
            registry
                .host_by_name(name)
                .with_context(|| format!("Unknown host '{}'", name))
        })
        .collect()
}

/// Let a pending connect settle, then disconnect if it succeeded
async fn shutdown_host(host: &Arc<Host>) {
    let mut status = host.subscribe();
    let settled = status
        .wait_for(|s| *s != HostStatus::Connecting)
        .await
        .map(|s| *s);

    if let Ok(HostStatus::Connected) = settled {
        let (tx, rx) = oneshot::channel();
        let requested = host.disconnect(move |status| {
            let _ = tx.send(status);
        });
        match requested {
            Ok(()) => {
                let _ = rx.await;
            }
            Err(e) => tracing::debug!("Skipping disconnect: {}", e),
        }
    }
}
