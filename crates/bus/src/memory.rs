use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use tandem_protocol::BusEvent;

use crate::{FanoutBus, Result, Subscription};

const SUBSCRIPTION_BUFFER: usize = 64;

type Topics = Arc<Mutex<HashMap<String, HashMap<u64, mpsc::Sender<BusEvent>>>>>;

/// Process-local [`FanoutBus`] for tests and single-node development; the
/// in-memory stand-in for the Redis channel layer.
#[derive(Default, Clone)]
pub struct MemoryBus {
    topics: Topics,
    next_id: Arc<AtomicU64>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FanoutBus for MemoryBus {
    async fn publish(&self, topic: &str, event: &BusEvent) -> Result<()> {
        let senders: Vec<mpsc::Sender<BusEvent>> = {
            let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(subs) = topics.get_mut(topic) {
                subs.retain(|_, tx| !tx.is_closed());
                subs.values().cloned().collect()
            } else {
                Vec::new()
            }
        };
        debug!(topic, receivers = senders.len(), "bus: published");
        for tx in senders {
            // Full or closed buffers drop the event; at-most-once delivery.
            let _ = tx.try_send(event.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            topics.entry(topic.to_string()).or_default().insert(id, tx);
        }

        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        Ok(Subscription::new(rx, move || {
            let mut topics = topics.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(subs) = topics.get_mut(&topic) {
                subs.remove(&id);
                if subs.is_empty() {
                    topics.remove(&topic);
                }
            }
        }))
    }

    async fn subscriber_count(&self, topic: &str) -> Result<u64> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let count = match topics.get_mut(topic) {
            Some(subs) => {
                subs.retain(|_, tx| !tx.is_closed());
                subs.len() as u64
            },
            None => 0,
        };
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tandem_protocol::DisconnectReason;

    use super::*;

    fn event() -> BusEvent {
        BusEvent::ForceDisconnect {
            reason: DisconnectReason::NewLogin,
        }
    }

    #[tokio::test]
    async fn events_fan_out_to_every_subscriber() {
        let bus = MemoryBus::new();
        let mut a = bus.subscribe("user_1").await.unwrap();
        let mut b = bus.subscribe("user_1").await.unwrap();

        bus.publish("user_1", &event()).await.unwrap();
        assert_eq!(a.recv().await, Some(event()));
        assert_eq!(b.recv().await, Some(event()));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = MemoryBus::new();
        let mut a = bus.subscribe("user_1").await.unwrap();

        bus.publish("user_2", &event()).await.unwrap();
        bus.publish("user_1", &event()).await.unwrap();

        // Only the user_1 publish arrives.
        assert_eq!(a.recv().await, Some(event()));
        assert_eq!(bus.subscriber_count("user_2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("user_1").await.unwrap();
        assert_eq!(bus.subscriber_count("user_1").await.unwrap(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count("user_1").await.unwrap(), 0);

        // Publishing into an empty topic is fine.
        bus.publish("user_1", &event()).await.unwrap();
    }
}
