//! Command-line argument definitions using clap.

use banshare_core::StatusKind;
use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Share fail2ban bans between hosts through a banshare registry.
///
/// Each host reports its own bans, applies the bans other hosts reported,
/// and lifts the ones the registry has released.
#[derive(Parser, Debug)]
#[command(name = "banshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Agent configuration file (default: the per-user config directory)
    #[arg(short, long, env = "BANSHARE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Registry URL, overriding `server_url`
    #[arg(long, env = "BANSHARE_SERVER", global = true)]
    pub server: Option<String>,

    /// Registry token, overriding `token`
    #[arg(long, env = "BANSHARE_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'L', long, default_value = "info", global = true)]
    pub log_level: String,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a synchronization cycle against the registry
    Sync(SyncArgs),

    /// Show how many IPs the registry holds per status
    Status,

    /// List registry records with a given status
    List(ListArgs),

    /// Manually allow a blocked IP
    Release(ReleaseArgs),

    /// Manage the agent configuration file
    Config(ConfigArgs),
}

// ============================================================================
// Sync command
// ============================================================================

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Keep running cycles until interrupted
    #[arg(short, long)]
    pub watch: bool,

    /// Seconds between cycles with --watch (default: `sync_interval_secs`)
    #[arg(long, requires = "watch")]
    pub interval: Option<u64>,
}

// ============================================================================
// List command
// ============================================================================

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Status to list: blocked, allowed or known
    #[arg(default_value = "blocked")]
    pub status: StatusKind,

    /// Only records whose IP contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Page number (1-indexed)
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub page: u32,

    /// Records per page
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: u32,

    /// Fetch every page instead of one
    #[arg(long, conflicts_with = "page")]
    pub all: bool,
}

// ============================================================================
// Release command
// ============================================================================

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// IP address to allow
    pub ip: IpAddr,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration (token masked)
    Show,

    /// Print the configuration file path
    Path,

    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
