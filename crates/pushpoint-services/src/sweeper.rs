//! Background eviction of idle registry entries.

use std::time::Duration;

use crate::registry::EndpointRegistry;

/// Sweep `registry` every `interval`.
///
/// Runs forever. Cancel by aborting the task handle.
pub async fn sweep_loop(registry: EndpointRegistry, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(interval_secs = interval.as_secs(), "registry sweeper starting");

    loop {
        ticker.tick().await;

        let evicted = registry.sweep();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = registry.len(), "evicted idle push endpoints");
        }
    }
}

/// Spawn [`sweep_loop`] on the current tokio runtime.
pub fn spawn_sweeper(registry: EndpointRegistry, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(sweep_loop(registry, interval))
}
