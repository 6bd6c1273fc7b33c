//! CLI subcommand definitions and handlers.
//!
//! Implements a git-like subcommand architecture:
//! - `pingboard serve` - Run the streaming scan server
//! - `pingboard probe <target>...` - Probe targets once and print a report

mod probe;
mod serve;

pub use probe::ProbeCommand;
pub use serve::ServeCommand;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pingboard - live ICMP reachability for a list of hosts.
///
/// The server resolves every host of a hosts file, pings every address once
/// per session and streams the results to the connected client.
#[derive(Parser, Debug)]
#[command(name = "pingboard")]
#[command(author = "HueCodes <huecodes@proton.me>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live ICMP reachability dashboard backend", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to custom configuration file
    #[arg(long, global = true, value_name = "PATH", env = "PINGBOARD_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve scan sessions over TCP
    #[command(alias = "s")]
    Serve(ServeCommand),

    /// Probe targets once and print the results
    #[command(alias = "p")]
    Probe(ProbeCommand),
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Check if running with root/admin privileges.
pub(crate) fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
