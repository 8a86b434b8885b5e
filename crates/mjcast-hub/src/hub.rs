use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Per-subscriber queue capacity used when none is configured.
pub const DEFAULT_CLIENT_QUEUE: usize = 2;

/// Registry of live subscribers. Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Subscriber id -> sending half of its queue. Dropping the sender closes
    /// the queue, so removal from this map is the single close point.
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    frames_broadcast: AtomicU64,
    frames_dropped: AtomicU64,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<u64, mpsc::Sender<Bytes>>,
    closed: bool,
}

/// What one `broadcast` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub subscribers: usize,
    pub frames_broadcast: u64,
    /// Per-subscriber drops summed over all subscribers.
    pub frames_dropped: u64,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
                frames_broadcast: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber with a queue of `capacity` frames (at least 1).
    ///
    /// After `close`, the returned subscription is already ended.
    pub fn register(&self, capacity: usize) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let mut registry = self.registry();
        if !registry.closed {
            registry.subscribers.insert(id, tx);
            debug!("hub: registered subscriber {} ({} live)", id, registry.subscribers.len());
        }
        drop(registry);

        Subscription { id, rx, hub: self.clone() }
    }

    /// Remove a subscriber and close its queue. Returns false if it was
    /// already gone, so repeated calls are harmless.
    pub fn unregister(&self, id: u64) -> bool {
        let removed = self.registry().subscribers.remove(&id);
        match removed {
            Some(_tx) => {
                debug!("hub: unregistered subscriber {}", id);
                true
            }
            None => false,
        }
    }

    /// Offer `frame` to every subscriber without waiting.
    ///
    /// A full queue loses the incoming frame for that subscriber only; the
    /// frames it already holds stay queued in order.
    pub fn broadcast(&self, frame: Bytes) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut registry = self.registry();

        registry.subscribers.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                outcome.dropped += 1;
                true
            }
            // Receiver dropped without unregistering.
            Err(TrySendError::Closed(_)) => {
                debug!("hub: pruning closed subscriber {}", id);
                false
            }
        });
        drop(registry);

        self.inner.frames_broadcast.fetch_add(1, Ordering::Relaxed);
        if outcome.dropped > 0 {
            self.inner
                .frames_dropped
                .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        }
        outcome
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Close every queue and refuse new subscribers. Each subscription
    /// drains what it already holds and then ends.
    pub fn close(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        let closed = registry.subscribers.len();
        registry.subscribers.clear();
        drop(registry);
        debug!("hub: closed, ended {} subscriptions", closed);
    }

    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            frames_broadcast: self.inner.frames_broadcast.load(Ordering::Relaxed),
            frames_dropped: self.inner.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// One consumer's end of the hub. Unregisters itself when dropped.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
    hub: Hub,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued frame, or None once the subscription was unregistered
    /// (or the hub closed) and the queue is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Frames currently waiting in this subscription's queue.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![tag; 16])
    }

    #[tokio::test]
    async fn test_full_subscriber_is_isolated() {
        let hub = Hub::new();
        let mut a = hub.register(2);
        let mut b = hub.register(2);
        let mut slow = hub.register(2);

        hub.register(2); // dropped at once, unregisters itself
        assert_eq!(hub.subscriber_count(), 3);

        // Pre-fill the slow subscriber to capacity.
        let slow_id = slow.id();
        {
            let registry = hub.registry();
            let tx = &registry.subscribers[&slow_id];
            tx.try_send(frame(1)).unwrap();
            tx.try_send(frame(2)).unwrap();
        }

        let outcome = hub.broadcast(frame(9));
        assert_eq!(outcome, BroadcastOutcome { delivered: 2, dropped: 1 });

        assert_eq!(a.recv().await.unwrap(), frame(9));
        assert_eq!(b.recv().await.unwrap(), frame(9));

        // The slow queue kept its original contents, in order.
        assert_eq!(slow.queued(), 2);
        assert_eq!(slow.recv().await.unwrap(), frame(1));
        assert_eq!(slow.recv().await.unwrap(), frame(2));
        assert_eq!(slow.queued(), 0);

        let stats = hub.stats();
        assert_eq!(stats.subscribers, 3);
        assert_eq!(stats.frames_broadcast, 1);
        assert_eq!(stats.frames_dropped, 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_frames_in_order() {
        let hub = Hub::new();
        let mut sub = hub.register(4);
        for tag in 1..=3 {
            hub.broadcast(frame(tag));
        }
        for tag in 1..=3 {
            assert_eq!(sub.recv().await.unwrap(), frame(tag));
        }
    }

    #[tokio::test]
    async fn test_unregister_closes_once() {
        let hub = Hub::new();
        let mut sub = hub.register(2);
        hub.broadcast(frame(5));

        assert!(hub.unregister(sub.id()));
        assert!(!hub.unregister(sub.id()));
        assert_eq!(hub.subscriber_count(), 0);

        // Queued frame still drains, then the queue reports closed.
        assert_eq!(sub.recv().await.unwrap(), frame(5));
        assert!(sub.recv().await.is_none());

        // Later broadcasts do not reach it.
        assert_eq!(hub.broadcast(frame(6)).delivered, 0);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_unregisters() {
        let hub = Hub::new();
        let a = hub.register(2);
        let b = hub.register(2);
        assert_eq!(hub.subscriber_count(), 2);
        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_every_subscription() {
        let hub = Hub::new();
        let mut a = hub.register(2);
        let mut b = hub.register(2);
        hub.close();

        assert!(hub.is_closed());
        assert_eq!(hub.subscriber_count(), 0);
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());

        let mut late = hub.register(2);
        assert!(late.recv().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let hub = Hub::new();
        let sub = hub.register(0);
        assert_eq!(hub.broadcast(frame(1)), BroadcastOutcome { delivered: 1, dropped: 0 });
        assert_eq!(hub.broadcast(frame(2)), BroadcastOutcome { delivered: 0, dropped: 1 });
        assert_eq!(sub.queued(), 1);
    }
}
