use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use tandem_protocol::BusEvent;

use crate::{Error, FanoutBus, Result, Subscription};

/// Capacity of the per-subscription buffer; a session that falls this far
/// behind starts losing events, which the at-most-once contract allows.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Redis pub/sub [`FanoutBus`]. Publishing goes through a shared connection
/// manager; each subscription holds its own pub/sub connection, mirroring
/// one channel-layer group membership per session.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl FanoutBus for RedisBus {
    async fn publish(&self, topic: &str, event: &BusEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!(topic, receivers, "bus: published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let client = self.client.clone();
        let topic = topic.to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();

        let task_topic = topic.clone();
        let handle = tokio::spawn(async move {
            let conn = match client.get_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(topic = %task_topic, error = %e, "bus: subscribe connection failed");
                    return;
                },
            };
            let mut pubsub = conn.into_pubsub();
            if let Err(e) = pubsub.subscribe(&task_topic).await {
                warn!(topic = %task_topic, error = %e, "bus: subscribe failed");
                return;
            }
            let _ = ready_tx.send(());

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(topic = %task_topic, error = %e, "bus: unreadable payload");
                        continue;
                    },
                };
                match serde_json::from_str::<BusEvent>(&payload) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    },
                    Err(e) => {
                        warn!(topic = %task_topic, error = %e, "bus: undecodable event");
                    },
                }
            }
        });

        // Don't hand the subscription back until SUBSCRIBE has been
        // acknowledged, or events published right after could be missed.
        ready_rx
            .await
            .map_err(|_| Error::message(format!("bus: subscriber task for {topic} died")))?;

        Ok(Subscription::new(rx, move || handle.abort()))
    }

    async fn subscriber_count(&self, topic: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        // NUMSUB for a single topic replies `[topic, count]`.
        let (_, count): (String, u64) = redis::cmd("PUBSUB")
            .arg("NUMSUB")
            .arg(topic)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}
