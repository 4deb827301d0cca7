//! fwdmng CLI
//!
//! Manage SSH hosts and their port forwards, and run the tunnels:
//! - Config editing (hosts, forwards)
//! - Listing
//! - `run`: connect hosts and relay until Ctrl-C

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fm_core::config::{self, HostConfig};
use fwdmng::commands::{self, ForwardEdit, HostEdit};
use fwdmng::output::print_error;

#[derive(Parser)]
#[command(name = "fwdmng")]
#[command(author, version, about = "SSH port-forwarding manager")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "FWDMNG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log filter (overrides -v/-q and RUST_LOG), e.g. "debug" or "fm_tunnel=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List hosts and forwards
    #[command(alias = "ls")]
    List {
        /// Only show this host
        host: Option<String>,
    },

    /// Add a host with one placeholder forward
    AddHost {
        /// Display name
        name: String,
        /// SSH endpoint, host[:port]
        hostname: String,
        /// Private key file
        #[arg(short, long)]
        key: PathBuf,
        /// Login user (defaults to the current user)
        #[arg(short, long)]
        user: Option<String>,
        /// HTTP CONNECT proxy, host:port
        #[arg(long)]
        proxy: Option<String>,
        /// Pinned server key fingerprint (SHA256:...)
        #[arg(long)]
        host_key: Option<String>,
    },

    /// Change a host's connection settings
    EditHost {
        host: String,
        /// New display name
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long)]
        key: Option<PathBuf>,
        /// HTTP CONNECT proxy; empty to clear
        #[arg(long)]
        proxy: Option<String>,
        /// Pinned fingerprint; empty to clear
        #[arg(long)]
        host_key: Option<String>,
    },

    /// Remove a host and its forwards
    RemoveHost { host: String },

    /// Add a forward to a host
    AddForward {
        host: String,
        /// Label
        #[arg(short, long)]
        name: Option<String>,
        /// Local bind address, [host]:port (port 0 disables)
        #[arg(short, long)]
        local: Option<String>,
        /// Remote target, host:port
        #[arg(short, long)]
        remote: Option<String>,
    },

    /// Change a forward's label or addresses
    EditForward {
        host: String,
        forward: String,
        /// New label
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        local: Option<String>,
        #[arg(short, long)]
        remote: Option<String>,
    },

    /// Remove a forward (removing the last one removes the host)
    RemoveForward { host: String, forward: String },

    /// Connect hosts and relay their forwards until Ctrl-C
    Run {
        /// Host to connect; repeat for several (default: all)
        #[arg(long = "host")]
        hosts: Vec<String>,
        /// Seconds between status tables
        #[arg(long, default_value_t = 10)]
        refresh: u64,
    },

    /// Show config file path
    ConfigPath,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = dispatch(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| default_level.to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::List { host } => commands::list_command(&path, host.as_deref()),

        Commands::AddHost {
            name,
            hostname,
            key,
            user,
            proxy,
            host_key,
        } => {
            let mut host = HostConfig::template();
            host.name = name;
            host.hostname = hostname;
            host.privkey = key;
            if let Some(user) = user {
                host.user = user;
            }
            host.proxy = proxy;
            host.host_key = host_key;
            commands::add_host_command(&path, host)
        }

        Commands::EditHost {
            host,
            rename,
            hostname,
            user,
            key,
            proxy,
            host_key,
        } => commands::edit_host_command(
            &path,
            &host,
            HostEdit {
                rename,
                hostname,
                user,
                privkey: key,
                proxy,
                host_key,
            },
        ),

        Commands::RemoveHost { host } => commands::remove_host_command(&path, &host),

        Commands::AddForward {
            host,
            name,
            local,
            remote,
        } => {
            commands::add_forward_command(&path, &host, ForwardEdit { name, local, remote }).await
        }

        Commands::EditForward {
            host,
            forward,
            name,
            local,
            remote,
        } => {
            commands::edit_forward_command(
                &path,
                &host,
                &forward,
                ForwardEdit { name, local, remote },
            )
            .await
        }

        Commands::RemoveForward { host, forward } => {
            commands::remove_forward_command(&path, &host, &forward)
        }

        Commands::Run { hosts, refresh } => {
            commands::run_command(&path, &hosts, Duration::from_secs(refresh)).await
        }

        Commands::ConfigPath => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
