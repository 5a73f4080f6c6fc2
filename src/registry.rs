use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::codec::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub slot: Slot,
    pub client: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub slot: Slot,
    pub client: SocketAddr,
    pub last_seen: Instant,
}

impl Subscription {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            slot: self.slot,
            client: self.client,
        }
    }

    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<SubscriptionKey, Instant>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or refreshes a subscription. Returns `true` when it is new.
    pub fn upsert(&self, slot: Slot, client: SocketAddr, now: Instant) -> bool {
        self.lock()
            .insert(SubscriptionKey { slot, client }, now)
            .is_none()
    }

    /// Point-in-time copy ordered by slot then client.
    pub fn snapshot_for_broadcast(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<Subscription> = self
            .lock()
            .iter()
            .map(|(key, &last_seen)| Subscription {
                slot: key.slot,
                client: key.client,
                last_seen,
            })
            .collect();
        subscriptions.sort_by_key(Subscription::key);
        subscriptions
    }

    /// Removes every entry whose age exceeds `ttl` and returns them.
    ///
    /// Ages are checked against the live map, so an entry refreshed after a
    /// snapshot was taken survives.
    pub fn evict_expired(&self, now: Instant, ttl: Duration) -> Vec<Subscription> {
        let mut entries = self.lock();
        let mut removed = Vec::new();
        entries.retain(|key, &mut last_seen| {
            let subscription = Subscription {
                slot: key.slot,
                client: key.client,
                last_seen,
            };
            if subscription.is_expired(now, ttl) {
                removed.push(subscription);
                false
            } else {
                true
            }
        });
        drop(entries);
        removed.sort_by_key(Subscription::key);
        removed
    }
}
