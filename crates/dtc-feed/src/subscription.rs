//! Per-adapter subscription book.
//!
//! The book is the authoritative record of what an adapter should be
//! receiving. Entries are keyed by `(product_id, kind)` where `product_id`
//! is in the exchange's native format. On reconnect the adapter replays
//! every `active` entry before declaring itself healthy.

use std::sync::Mutex;

use ahash::AHashMap;
use dtc_core::time_util;

/// Kind of upstream channel a subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Trades,
    Level2,
    Ticker,
    Heartbeat,
}

/// One recorded subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub kind: SubscriptionKind,
    /// Exchange-format product id (e.g. `BTC-USD`).
    pub product_id: String,
    pub active: bool,
    /// Wall-clock ms when the subscription was first requested.
    pub subscribed_at: u64,
}

/// Thread-safe subscription table. Locks are held only for map access.
#[derive(Default)]
pub struct SubscriptionBook {
    entries: Mutex<AHashMap<(String, SubscriptionKind), Subscription>>,
}

impl SubscriptionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Returns `true` when this is a new entry,
    /// `false` when it already existed (idempotent re-subscribe).
    pub fn add(&self, product_id: &str, kind: SubscriptionKind) -> bool {
        let mut entries = self.entries.lock().expect("subscription book poisoned");
        let key = (product_id.to_string(), kind);
        if let Some(existing) = entries.get_mut(&key) {
            let was_active = existing.active;
            existing.active = true;
            return !was_active;
        }
        entries.insert(
            key,
            Subscription {
                kind,
                product_id: product_id.to_string(),
                active: true,
                subscribed_at: time_util::now_ms(),
            },
        );
        true
    }

    /// Drop every subscription for a product. Returns the kinds that were
    /// active, so the caller can send the matching unsubscribe messages.
    pub fn remove_product(&self, product_id: &str) -> Vec<SubscriptionKind> {
        let mut entries = self.entries.lock().expect("subscription book poisoned");
        let mut removed = Vec::new();
        entries.retain(|(product, kind), sub| {
            if product == product_id {
                if sub.active {
                    removed.push(*kind);
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Snapshot of every active subscription (replay set).
    pub fn active(&self) -> Vec<Subscription> {
        self.entries
            .lock()
            .expect("subscription book poisoned")
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect()
    }

    /// Active product ids for one kind, deduplicated.
    pub fn active_products(&self, kind: SubscriptionKind) -> Vec<String> {
        let mut products: Vec<String> = self
            .entries
            .lock()
            .expect("subscription book poisoned")
            .values()
            .filter(|s| s.active && s.kind == kind)
            .map(|s| s.product_id.clone())
            .collect();
        products.sort();
        products.dedup();
        products
    }

    /// Distinct products with at least one active subscription.
    pub fn products(&self) -> Vec<String> {
        let mut products: Vec<String> = self
            .entries
            .lock()
            .expect("subscription book poisoned")
            .values()
            .filter(|s| s.active)
            .map(|s| s.product_id.clone())
            .collect();
        products.sort();
        products.dedup();
        products
    }

    pub fn contains(&self, product_id: &str, kind: SubscriptionKind) -> bool {
        self.entries
            .lock()
            .expect("subscription book poisoned")
            .get(&(product_id.to_string(), kind))
            .is_some_and(|s| s.active)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("subscription book poisoned")
            .values()
            .filter(|s| s.active)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
