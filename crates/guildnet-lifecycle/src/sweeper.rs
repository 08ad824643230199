//! Deadline sweeper — a long-lived task that walks the mission set on a
//! fixed interval, expiring missions past their deadline and closing
//! elapsed bidding windows.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use guildnet_core::constants::SWEEP_INTERVAL_SECS;

use crate::engine::MissionEngine;

/// Run the sweep loop until `shutdown` flips to `true`.
pub async fn run_sweeper(engine: Arc<MissionEngine>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match engine.sweep() {
                    Ok(0) => debug!("sweep: nothing to do"),
                    Ok(n) => debug!(swept = n, "sweep: terminalised missions"),
                    Err(e) => warn!(error = %e, "sweep pass failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("sweeper shutting down");
                    return;
                }
            }
        }
    }
}
