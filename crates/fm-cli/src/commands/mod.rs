//! CLI command implementations

mod forwards;
mod hosts;
mod list;
mod run;

pub use forwards::{add_forward_command, edit_forward_command, remove_forward_command, ForwardEdit};
pub use hosts::{add_host_command, edit_host_command, remove_host_command, HostEdit};
pub use list::list_command;
pub use run::run_command;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use fm_core::config::{self, Config};
use fm_tunnel::{Registry, RusshConnector};

/// Load the config file (empty when missing) into a registry
pub(crate) fn open_registry(path: &Path) -> Result<Registry> {
    let config: Config = config::load_or_default(path)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;
    let connector = RusshConnector::new(config.tunnel.keepalive_interval);
    Ok(Registry::from_config(&config, Arc::new(connector)))
}

/// Write the registry back to the config file
pub(crate) fn save_registry(path: &Path, registry: &Registry) -> Result<()> {
    config::save_config(path, &registry.to_config())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}
