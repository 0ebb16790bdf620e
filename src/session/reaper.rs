//! Exited-session reaper.
//!
//! Periodically sweeps the registry for sessions whose engine has exited and
//! removes them. The exit event handler is the primary removal path; this
//! sweep only catches sessions whose exit was missed or whose final buffered
//! move was never collected.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::SessionRegistry;

/// Spawn a background task that calls [`SessionRegistry::reap_exited`]
/// every `interval` until `cancel` fires.
#[must_use]
pub fn spawn_reaper(
    registry: SessionRegistry,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("session reaper shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            let reaped = registry.reap_exited().await;
            if reaped.is_empty() {
                debug!("reaper sweep found no exited sessions");
            } else {
                info!(count = reaped.len(), sessions = ?reaped, "reaped exited sessions");
            }
        }
    })
}
