//! tabtrace - network request capture over Chromium remote debugging.
//!
//! Main entry point for the tabtrace CLI and daemon.

use clap::Parser;
use tracing::error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tabtrace_daemon::{CaptureConfig, DaemonError};

mod cli;
mod cmd_daemon;
mod cmd_query;

use cli::{Cli, Commands, DaemonAction};
use cmd_daemon::EXIT_BROWSER_UNAVAILABLE;

/// Initialize tracing for the long-running daemon: stderr plus a rolling
/// file in the configured log directory.
fn init_daemon_tracing(config: &CaptureConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("tabtrace")
        .filename_suffix("log")
        .max_log_files(7)
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the life of the process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true).with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Initialize tracing for short-lived CLI invocations: stderr only, quiet
/// by default so command output stays clean.
fn init_cli_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CaptureConfig::load(path),
        None => Ok(CaptureConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let is_daemon_run = matches!(
        cli.command,
        Commands::Daemon {
            action: DaemonAction::Run
        }
    );
    if is_daemon_run {
        if let Err(e) = init_daemon_tracing(&config) {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    } else {
        init_cli_tracing();
    }

    let result = match cli.command {
        Commands::Daemon { action } => cmd_daemon::handle_daemon_command(action, config).await,
        Commands::List {
            tab,
            filter,
            types,
            failed,
            json,
        } => cmd_query::cmd_list(config, tab, filter, types, failed, json).await,
        Commands::Get {
            tab,
            id,
            headers,
            body,
            request_body,
            json,
        } => cmd_query::cmd_get(config, tab, id, headers, body, request_body, json).await,
        Commands::Clear { tab } => cmd_query::cmd_clear(config, tab).await,
    };

    match result {
        Ok(()) => {}
        Err(e @ DaemonError::BrowserUnavailable(_)) => {
            error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(EXIT_BROWSER_UNAVAILABLE);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
