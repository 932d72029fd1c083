//! Game server monitor: detects the server exiting on its own.
//!
//! If the supervised server dies outside a reset, the daemon terminates as
//! well so the supervisor restarts the pair. During a reset the save task
//! owns the stop and the monitor steps aside.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::host::ChildServer;
use crate::lifecycle::Lifecycle;
use crate::reset::coordinator::EXIT_SERVER_EXITED;
use crate::reset::PendingReset;

/// Default interval between polls of the server process.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Spawn a background task that polls `server` every `interval` until `ct`
/// fires or the server exits.
#[must_use]
pub fn spawn_server_monitor(
    server: Arc<ChildServer>,
    state: Arc<PendingReset>,
    lifecycle: Arc<Lifecycle>,
    ct: CancellationToken,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = ct.cancelled() => {
                    info!("server monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            match server.exit_status() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    if state.is_active() {
                        info!(%status, "game server exited during reset");
                        break;
                    }
                    error!(%status, "game server exited unexpectedly; terminating for restart");
                    let lifecycle = Arc::clone(&lifecycle);
                    if let Err(err) =
                        tokio::task::spawn_blocking(move || lifecycle.terminate(EXIT_SERVER_EXITED))
                            .await
                    {
                        error!(%err, "termination task failed");
                    }
                    break;
                }
                Err(err) => warn!(%err, "failed to poll game server status"),
            }
        }
    })
}
