//! A small fan-out bus used for the signal, outage and alert streams
//! (spec.md §5, §9 "Fan-out buses").
//!
//! Every subscriber owns a bounded queue with drop-oldest overflow: a slow
//! consumer loses history, never blocks the publisher. The bus holds only
//! weak references to each subscriber's queue, so dropping the subscriber
//! handle is what "unsubscribes" it — there is no separate cancellation
//! token to manage.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, Notify, RwLock};

struct Queue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Queue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
        }
    }

    async fn push(&self, item: T) {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_one();
    }
}

/// A bus subscription: an async stream of published values with drop-oldest
/// back-pressure. Dropping this removes the subscriber from the bus.
pub struct Subscription<T> {
    queue: Arc<Queue<T>>,
}

impl<T> Subscription<T> {
    /// Wait for and return the next published value.
    pub async fn recv(&mut self) -> T {
        loop {
            {
                let mut items = self.queue.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return item;
                }
            }
            self.queue.notify.notified().await;
        }
    }
}

/// A publish side fanning values out to every live subscriber.
pub struct Bus<T> {
    subscribers: RwLock<Vec<Weak<Queue<T>>>>,
    capacity: usize,
}

impl<T: Clone + Send + Sync + 'static> Bus<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Register a new subscriber with the bus's default per-subscriber
    /// buffer size.
    pub async fn subscribe(&self) -> Subscription<T> {
        let queue = Arc::new(Queue::new(self.capacity));
        self.subscribers.write().await.push(Arc::downgrade(&queue));
        Subscription { queue }
    }

    /// Publish a value to every live subscriber, pruning dead ones.
    pub async fn publish(&self, value: T) {
        let subscribers = self.subscribers.read().await;
        for weak in subscribers.iter() {
            if let Some(queue) = weak.upgrade() {
                queue.push(value.clone()).await;
            }
        }
        drop(subscribers);

        // Opportunistically prune subscribers whose handle was dropped.
        // Cheap relative to publish frequency (sub-second at most).
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|w| w.strong_count() > 0);
    }

    /// Number of currently live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.iter().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_to_all_subscribers() {
        let bus: Bus<i32> = Bus::new(8);
        let mut a = bus.subscribe().await;
        let mut b = bus.subscribe().await;
        bus.publish(42).await;
        assert_eq!(a.recv().await, 42);
        assert_eq!(b.recv().await, 42);
    }

    #[tokio::test]
    async fn drops_oldest_on_overflow() {
        let bus: Bus<i32> = Bus::new(2);
        let mut sub = bus.subscribe().await;
        bus.publish(1).await;
        bus.publish(2).await;
        bus.publish(3).await; // should push out `1`
        assert_eq!(sub.recv().await, 2);
        assert_eq!(sub.recv().await, 3);
    }

    #[tokio::test]
    async fn dropping_subscription_removes_it() {
        let bus: Bus<i32> = Bus::new(4);
        let sub = bus.subscribe().await;
        assert_eq!(bus.subscriber_count().await, 1);
        drop(sub);
        bus.publish(1).await; // triggers the prune pass
        assert_eq!(bus.subscriber_count().await, 0);
    }
}
