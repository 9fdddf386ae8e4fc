//! Cross-process fan-out: lets a session supervisor on node X push an event
//! into the session belonging to a user hosted on node Y.
//!
//! Delivery is at-most-once and best-effort; the state store (not the bus)
//! is the source of truth. Topics are `user_{id}` for supervisors and
//! `voicechat_{room}` for signaling rooms.

use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod error;
pub mod memory;
pub mod redis;

pub use {self::redis::RedisBus, error::{Error, Result}, memory::MemoryBus};

use tandem_protocol::BusEvent;

/// Pub/sub fan-out channel.
#[async_trait]
pub trait FanoutBus: Send + Sync {
    /// Publish an event to everyone currently subscribed to `topic`.
    async fn publish(&self, topic: &str, event: &BusEvent) -> Result<()>;

    /// Subscribe to `topic`. The subscription ends when the returned handle
    /// is dropped.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// Best-effort count of live subscribers on `topic`. Used to detect a
    /// previous session for the same user before preempting it.
    async fn subscriber_count(&self, topic: &str) -> Result<u64>;
}

/// A live topic subscription; dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<BusEvent>,
    _cleanup: Cleanup,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<BusEvent>, cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            _cleanup: Cleanup(Some(Box::new(cleanup))),
        }
    }

    /// Next event, or `None` once the backend side has gone away.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }
}

struct Cleanup(Option<Box<dyn FnOnce() + Send>>);

impl Drop for Cleanup {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}
