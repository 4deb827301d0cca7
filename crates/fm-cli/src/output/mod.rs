//! Output formatting utilities for the CLI
//!
//! Tables for the host/forward listing plus colored one-line status
//! messages.

use tabled::{settings::Style, Table, Tabled};

use fm_core::ByteCount;
use fm_tunnel::{ForwardView, HostView, ListItem};

/// Format registry rows as an ASCII table
///
/// Hosts are followed by their forwards, which are indented under them.
/// Traffic columns only carry information while a `run` is in progress.
pub fn format_items(items: &[ListItem]) -> String {
    if items.is_empty() {
        return "No hosts configured".to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "LOCAL / ENDPOINT")]
        local: String,
        #[tabled(rename = "REMOTE / USER")]
        remote: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "SESSIONS")]
        sessions: String,
        #[tabled(rename = "SENT")]
        sent: String,
        #[tabled(rename = "RECEIVED")]
        received: String,
    }

    let rows: Vec<Row> = items
        .iter()
        .map(|item| match item {
            ListItem::Host(host) => host_row(host),
            ListItem::Forward(forward) => forward_row(forward),
        })
        .map(|(name, local, remote, state, sessions, bytes)| Row {
            name,
            local,
            remote,
            state,
            sessions,
            sent: bytes.map(|b| format_bytes(b.sent)).unwrap_or_default(),
            received: bytes.map(|b| format_bytes(b.received)).unwrap_or_default(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

type Cells = (String, String, String, String, String, Option<ByteCount>);

fn host_row(host: &HostView) -> Cells {
    (
        host.name.clone(),
        host.hostname.clone(),
        host.user.clone(),
        host_state(host),
        String::new(),
        None,
    )
}

fn host_state(host: &HostView) -> String {
    if host.status.is_transitioning() {
        format!("{}...", host.status)
    } else {
        host.status.to_string()
    }
}

fn forward_row(forward: &ForwardView) -> Cells {
    let state = match forward.listening {
        Some(addr) => format!("listening {}", addr),
        None => "idle".to_string(),
    };
    (
        format!("  └ {}", forward.name),
        forward.local.clone(),
        forward.remote.clone(),
        state,
        forward.sessions.to_string(),
        Some(forward.bytes),
    )
}

/// Format a byte count in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
