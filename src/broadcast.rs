use std::sync::Arc;
use std::time::Instant;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::Subscription;
use crate::server::Shared;

pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = time::interval(shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_ms = shared.interval.as_millis() as u64, "broadcaster started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick(&shared) => {}
        }
    }

    debug!("broadcaster stopped");
}

async fn tick(shared: &Shared) {
    let now = Instant::now();
    let (expired, live): (Vec<Subscription>, Vec<Subscription>) = shared
        .registry
        .snapshot_for_broadcast()
        .into_iter()
        .partition(|s| s.is_expired(now, shared.ttl));

    if !expired.is_empty() {
        for gone in shared.registry.evict_expired(now, shared.ttl) {
            info!(client = %gone.client, slot = gone.slot, "subscription expired");
        }
    }

    for subscription in live {
        shared
            .send_controller_data(subscription.slot, subscription.client)
            .await;
    }
}
