//! Periodic removal of temp files orphaned by crashed requests.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use voicedesc_descriptor::sweep_stale;

/// Spawns a task that sweeps `dir` every `interval`, starting immediately.
pub fn spawn(dir: PathBuf, interval: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let dir = dir.clone();
            match tokio::task::spawn_blocking(move || sweep_stale(&dir, max_age)).await {
                Ok(Ok(0)) => debug!("sweep: nothing to remove"),
                Ok(Ok(n)) => info!(removed = n, "sweep: removed stale temp files"),
                Ok(Err(e)) => error!(error = %e, "sweep failed"),
                Err(e) => error!(error = %e, "sweep task failed"),
            }
        }
    })
}
