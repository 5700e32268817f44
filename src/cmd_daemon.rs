//! Daemon subcommand handlers.

use tracing::info;

use tabtrace_daemon::identity::{is_process_alive, DaemonIdentity};
use tabtrace_daemon::{CaptureConfig, DaemonClient, DaemonError, NetworkDaemon};

use crate::cli::DaemonAction;

/// Exit code when the browser's debugging endpoint is unreachable,
/// distinct from general failures.
pub(crate) const EXIT_BROWSER_UNAVAILABLE: i32 = 2;

pub(crate) async fn handle_daemon_command(
    action: DaemonAction,
    config: CaptureConfig,
) -> Result<(), DaemonError> {
    match action {
        DaemonAction::Run => daemon_run(config).await,
        DaemonAction::Status => daemon_status(config).await,
        DaemonAction::Stop => daemon_stop(config),
    }
}

/// Run the daemon in the foreground until shutdown.
async fn daemon_run(config: CaptureConfig) -> Result<(), DaemonError> {
    info!("Starting tabtrace daemon v{}", env!("CARGO_PKG_VERSION"));
    NetworkDaemon::new(config).run().await
}

async fn daemon_status(config: CaptureConfig) -> Result<(), DaemonError> {
    match DaemonIdentity::read(&config.identity_path) {
        Some(identity) if is_process_alive(identity.pid) => {
            let client = DaemonClient::new(config);
            if client.daemon_running().await {
                println!(
                    "Daemon is RUNNING (PID {}, socket {})",
                    identity.pid,
                    identity.socket_path.display()
                );
            } else {
                println!(
                    "Daemon process {} is alive but not answering on {}",
                    identity.pid,
                    identity.socket_path.display()
                );
            }
        }
        Some(identity) => {
            println!("Daemon is NOT RUNNING (stale identity file, PID {})", identity.pid);
        }
        None => {
            println!("Daemon is NOT RUNNING");
        }
    }
    Ok(())
}

fn daemon_stop(config: CaptureConfig) -> Result<(), DaemonError> {
    let client = DaemonClient::new(config);
    if client.stop_daemon()? {
        println!("Shutdown requested");
    } else {
        println!("Daemon is not running");
    }
    Ok(())
}
