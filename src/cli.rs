//! CLI definitions for tabtrace.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tabtrace CLI.
#[derive(Parser)]
#[command(name = "tabtrace")]
#[command(about = "Network request capture for a Chromium remote-debugging endpoint")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Daemon management commands
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// List captured requests (starts the daemon if needed)
    List {
        /// Only requests from this tab
        #[arg(long)]
        tab: Option<String>,

        /// Keep only URLs containing this substring
        #[arg(long)]
        filter: Option<String>,

        /// Keep only these resource types (comma-separated, e.g. xhr,fetch)
        #[arg(long = "type", value_delimiter = ',')]
        types: Vec<String>,

        /// Keep only failed requests
        #[arg(long)]
        failed: bool,

        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one captured request in full
    Get {
        /// Tab the request belongs to
        #[arg(long)]
        tab: String,

        /// Request id from `list`
        id: u64,

        /// Include request and response headers
        #[arg(long)]
        headers: bool,

        /// Include the response body
        #[arg(long)]
        body: bool,

        /// Include the request body
        #[arg(long)]
        request_body: bool,

        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Discard captured requests
    Clear {
        /// Only requests from this tab
        #[arg(long)]
        tab: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum DaemonAction {
    /// Run the capture daemon in the foreground
    Run,

    /// Show daemon status
    Status,

    /// Stop a running daemon
    Stop,
}
