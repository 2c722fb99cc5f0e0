//! Reference-counted signal subscriptions.
//!
//! One [`SignalRecord`] exists per device-side subscription. Its subscriber
//! map is the reference count: the device is asked to subscribe when a path
//! has no record yet, and to unsubscribe when the last local subscriber
//! detaches.
//!
//! The registry itself never talks to the device; the caller performs the
//! device round trips around these purely local operations and serializes
//! whole subscribe/unsubscribe sequences.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{SignalBody, SignalId, SubscriptionId};

#[derive(Debug)]
struct SignalRecord {
    path: String,
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<SignalBody>>,
}

impl SignalRecord {
    fn count(&self) -> usize {
        self.subscribers.len()
    }
}

#[derive(Debug, Default)]
pub(crate) struct SignalRegistry {
    subscription_counter: u64,
    signal_by_path: HashMap<String, SignalId>,
    records: HashMap<SignalId, SignalRecord>,
    closed: bool,
}

impl SignalRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_subscription_id(&mut self) -> SubscriptionId {
        self.subscription_counter += 1;
        SubscriptionId(self.subscription_counter)
    }

    /// Signal identifier of the live device-side subscription for `path`.
    pub(crate) fn signal_for(&self, path: &str) -> Option<SignalId> {
        self.signal_by_path.get(path).cloned()
    }

    /// Register a fresh delivery channel for `subscription_id`, creating the
    /// path mapping and record if this is the first subscriber.
    pub(crate) fn attach(
        &mut self,
        path: &str,
        signal_id: &SignalId,
        subscription_id: SubscriptionId,
    ) -> Result<mpsc::UnboundedReceiver<SignalBody>> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.signal_by_path
            .entry(path.to_string())
            .or_insert_with(|| signal_id.clone());
        let record = self
            .records
            .entry(signal_id.clone())
            .or_insert_with(|| SignalRecord {
                path: path.to_string(),
                subscribers: HashMap::new(),
            });
        let (tx, rx) = mpsc::unbounded_channel();
        record.subscribers.insert(subscription_id, tx);
        log::debug!(
            "[G3] Subscriber {} attached to {} (signal {}, {} local)",
            subscription_id,
            path,
            signal_id,
            record.count()
        );
        Ok(rx)
    }

    /// Remove one subscriber's channel.
    ///
    /// Returns how many subscribers remain on the signal, or `None` after
    /// teardown (nothing left to release).
    pub(crate) fn detach(
        &mut self,
        signal_id: &SignalId,
        subscription_id: SubscriptionId,
    ) -> Option<usize> {
        if self.closed {
            return None;
        }
        let Some(record) = self.records.get_mut(signal_id) else {
            return Some(0);
        };
        record.subscribers.remove(&subscription_id);
        log::debug!(
            "[G3] Subscriber {} detached from {} (signal {}, {} local)",
            subscription_id,
            record.path,
            signal_id,
            record.count()
        );
        Some(record.count())
    }

    /// Drop the path mapping and record once the device confirmed the
    /// unsubscribe. Keeps them if a subscriber attached in the meantime.
    pub(crate) fn forget(&mut self, path: &str, signal_id: &SignalId) {
        if self
            .records
            .get(signal_id)
            .is_some_and(|record| record.count() > 0)
        {
            return;
        }
        self.records.remove(signal_id);
        if self.signal_by_path.get(path) == Some(signal_id) {
            self.signal_by_path.remove(path);
        }
    }

    /// Push an independent copy of `body` to every subscriber of `signal_id`.
    /// Returns the number of channels that accepted it.
    pub(crate) fn fan_out(&self, signal_id: &SignalId, body: &SignalBody) -> usize {
        let Some(record) = self.records.get(signal_id) else {
            return 0;
        };
        record
            .subscribers
            .values()
            .filter(|tx| tx.send(body.clone()).is_ok())
            .count()
    }

    /// Local subscribers currently registered for `path`.
    pub(crate) fn subscriber_count(&self, path: &str) -> usize {
        self.signal_by_path
            .get(path)
            .and_then(|signal_id| self.records.get(signal_id))
            .map_or(0, SignalRecord::count)
    }

    /// Stop all delivery. Receivers drain what is queued, then see the end
    /// of the stream.
    pub(crate) fn close(&mut self) -> usize {
        self.closed = true;
        self.signal_by_path.clear();
        let dropped = self.records.values().map(SignalRecord::count).sum();
        self.records.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sig(id: &str) -> SignalId {
        SignalId::from(id)
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        let mut registry = SignalRegistry::new();
        let a = registry.allocate_subscription_id();
        let b = registry.allocate_subscription_id();
        assert_ne!(a, b);
        assert_eq!(a, SubscriptionId(1));
    }

    #[test]
    fn test_attach_creates_mapping_once() {
        let mut registry = SignalRegistry::new();
        assert!(registry.signal_for("/recorder:started").is_none());

        let _a = registry
            .attach("/recorder:started", &sig("sig-7"), SubscriptionId(1))
            .unwrap();
        let _b = registry
            .attach("/recorder:started", &sig("sig-7"), SubscriptionId(2))
            .unwrap();

        assert_eq!(registry.signal_for("/recorder:started"), Some(sig("sig-7")));
        assert_eq!(registry.subscriber_count("/recorder:started"), 2);
    }

    #[test]
    fn test_fan_out_delivers_independent_copies() {
        let mut registry = SignalRegistry::new();
        let mut a = registry.attach("/p", &sig("s"), SubscriptionId(1)).unwrap();
        let mut b = registry.attach("/p", &sig("s"), SubscriptionId(2)).unwrap();

        assert_eq!(registry.fan_out(&sig("s"), &vec![json!({"n": 1})]), 2);

        let mut first = a.try_recv().unwrap();
        first[0]["n"] = json!(99);
        assert_eq!(b.try_recv().unwrap(), vec![json!({"n": 1})]);
    }

    #[test]
    fn test_fan_out_unknown_signal_delivers_nothing() {
        let registry = SignalRegistry::new();
        assert_eq!(registry.fan_out(&sig("ghost"), &vec![]), 0);
    }

    #[test]
    fn test_detach_counts_down_and_forget_clears() {
        let mut registry = SignalRegistry::new();
        let _a = registry.attach("/p", &sig("s"), SubscriptionId(1)).unwrap();
        let _b = registry.attach("/p", &sig("s"), SubscriptionId(2)).unwrap();

        assert_eq!(registry.detach(&sig("s"), SubscriptionId(1)), Some(1));
        assert_eq!(registry.detach(&sig("s"), SubscriptionId(2)), Some(0));
        // Mapping survives until the device confirms.
        assert_eq!(registry.signal_for("/p"), Some(sig("s")));

        registry.forget("/p", &sig("s"));
        assert!(registry.signal_for("/p").is_none());
        assert_eq!(registry.fan_out(&sig("s"), &vec![]), 0);
    }

    #[test]
    fn test_forget_keeps_record_with_live_subscribers() {
        let mut registry = SignalRegistry::new();
        let _a = registry.attach("/p", &sig("s"), SubscriptionId(1)).unwrap();
        registry.forget("/p", &sig("s"));
        assert_eq!(registry.subscriber_count("/p"), 1);
    }

    #[test]
    fn test_detached_channel_receives_nothing_more() {
        let mut registry = SignalRegistry::new();
        let mut a = registry.attach("/p", &sig("s"), SubscriptionId(1)).unwrap();
        let _b = registry.attach("/p", &sig("s"), SubscriptionId(2)).unwrap();
        registry.detach(&sig("s"), SubscriptionId(1));

        assert_eq!(registry.fan_out(&sig("s"), &vec![json!(1)]), 1);
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_ends_streams_after_queued_events() {
        let mut registry = SignalRegistry::new();
        let mut rx = registry.attach("/p", &sig("s"), SubscriptionId(1)).unwrap();
        registry.fan_out(&sig("s"), &vec![json!("queued")]);

        assert_eq!(registry.close(), 1);
        assert_eq!(rx.recv().await, Some(vec![json!("queued")]));
        assert_eq!(rx.recv().await, None);

        assert!(registry.detach(&sig("s"), SubscriptionId(1)).is_none());
        assert!(matches!(
            registry.attach("/p", &sig("s"), SubscriptionId(2)),
            Err(Error::ConnectionClosed)
        ));
    }
}
