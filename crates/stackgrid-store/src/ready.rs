//! Startup readiness probing with exponential backoff.

use std::time::Duration;

use tracing::{info, warn};

use crate::accessor::ResourceStore;
use crate::error::StoreResult;

/// Longest pause between two readiness probes.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Ping the store up to `attempts` times, doubling the pause after each
/// failure (starting at `initial`, capped at [`MAX_BACKOFF`]). Returns the
/// last error when every attempt failed.
pub async fn wait_until_ready(
    store: &dyn ResourceStore,
    attempts: u32,
    initial: Duration,
) -> StoreResult<()> {
    let attempts = attempts.max(1);
    let mut delay = initial;
    let mut attempt = 1;

    loop {
        match store.ping().await {
            Ok(()) => {
                info!(attempt, "graph store is ready");
                return Ok(());
            }
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(
                    attempt,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "graph store not ready, retrying with backoff"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
        }
    }
}
