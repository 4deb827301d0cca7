//! List command implementation

use std::path::Path;

use anyhow::Result;

use super::open_registry;
use crate::output::format_items;

/// Print the configured hosts and forwards
pub fn list_command(path: &Path, host: Option<&str>) -> Result<()> {
    let registry = open_registry(path)?;

    let items: Vec<_> = match host {
        Some(name) => registry
            .items()
            .into_iter()
            .filter(|item| {
                registry
                    .host(item.host_id())
                    .map(|h| h.name() == name)
                    .unwrap_or(false)
            })
            .collect(),
        None => registry.items(),
    };

    println!("{}", format_items(&items));
    Ok(())
}
