use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::state::AppState;

/// Periodically evicts idle tracks and their cached spectrograms. Returns
/// `None` when expiry is disabled or the interval is zero.
pub fn spawn_sweeper(state: AppState, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() || state.registry.policy().idle_ttl().is_none() {
        info!("idle track sweeping disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Read through tokio's clock so a paused runtime controls expiry.
            let now = tokio::time::Instant::now().into_std();
            let expired = state.registry.sweep_expired(now);
            if expired.is_empty() {
                continue;
            }
            let purged: usize = expired
                .iter()
                .map(|id| state.spectrograms.purge_track(id))
                .sum();
            debug!(tracks = expired.len(), purged, "idle tracks evicted");
        }
    }))
}
