use std::collections::HashMap;

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use tandem_protocol::UserId;

use crate::{MatchRecord, MatchStore, Result, Ttls};

#[derive(Default)]
struct Inner {
    presence: HashMap<UserId, Instant>,
    queue: HashMap<UserId, f64>,
    active: HashMap<UserId, (String, Instant)>,
    records: HashMap<String, (MatchRecord, Instant)>,
    lock: Option<(UserId, Instant)>,
}

impl Inner {
    /// Drop everything whose TTL has passed; mirrors Redis lazy expiry
    /// closely enough for the callers, which never rely on eager eviction.
    fn purge(&mut self, now: Instant) {
        self.presence.retain(|_, expires| *expires > now);
        self.active.retain(|_, (_, expires)| *expires > now);
        self.records.retain(|_, (_, expires)| *expires > now);
        if self.lock.is_some_and(|(_, expires)| expires <= now) {
            self.lock = None;
        }
    }
}

/// Process-local [`MatchStore`] for tests and single-node development.
/// Uses tokio's clock, so paused-time tests can drive TTL expiry.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    ttls: Ttls,
}

impl MemoryStore {
    pub fn new(ttls: Ttls) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttls,
        }
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn mark_online(&self, user: UserId) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge(now);
        inner.presence.insert(user, now + self.ttls.online);
        Ok(())
    }

    async fn mark_offline(&self, user: UserId) -> Result<()> {
        self.inner.lock().await.presence.remove(&user);
        Ok(())
    }

    async fn is_online(&self, user: UserId) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge(now);
        Ok(inner.presence.contains_key(&user))
    }

    async fn enqueue_waiting(&self, user: UserId, score: f64) -> Result<()> {
        self.inner.lock().await.queue.insert(user, score);
        Ok(())
    }

    async fn dequeue_waiting(&self, user: UserId) -> Result<()> {
        self.inner.lock().await.queue.remove(&user);
        Ok(())
    }

    async fn range_waiting(&self) -> Result<Vec<UserId>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<(UserId, f64)> =
            inner.queue.iter().map(|(u, s)| (*u, *s)).collect();
        // Score order, ties by member string like a Redis sorted set.
        entries.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.to_string().cmp(&b.0.to_string()))
        });
        Ok(entries.into_iter().map(|(u, _)| u).collect())
    }

    async fn queue_score(&self, user: UserId) -> Result<Option<f64>> {
        Ok(self.inner.lock().await.queue.get(&user).copied())
    }

    async fn queue_len(&self) -> Result<u64> {
        Ok(self.inner.lock().await.queue.len() as u64)
    }

    async fn get_active_match(&self, user: UserId) -> Result<Option<String>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge(now);
        Ok(inner.active.get(&user).map(|(id, _)| id.clone()))
    }

    async fn set_active_match(&self, user: UserId, match_id: &str) -> Result<()> {
        let expires = Instant::now() + self.ttls.match_ttl;
        self.inner
            .lock()
            .await
            .active
            .insert(user, (match_id.to_string(), expires));
        Ok(())
    }

    async fn delete_active_match(&self, user: UserId) -> Result<()> {
        self.inner.lock().await.active.remove(&user);
        Ok(())
    }

    async fn put_match_record(&self, record: &MatchRecord) -> Result<()> {
        let expires = Instant::now() + self.ttls.match_ttl;
        self.inner
            .lock()
            .await
            .records
            .insert(record.match_id.clone(), (record.clone(), expires));
        Ok(())
    }

    async fn get_match_record(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge(now);
        Ok(inner.records.get(match_id).map(|(r, _)| r.clone()))
    }

    async fn delete_match_record(&self, match_id: &str) -> Result<()> {
        self.inner.lock().await.records.remove(match_id);
        Ok(())
    }

    async fn try_acquire_global_match_lock(&self, holder: UserId) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.purge(now);
        if inner.lock.is_some() {
            return Ok(false);
        }
        inner.lock = Some((holder, now + self.ttls.lock));
        Ok(true)
    }

    async fn release_global_match_lock(&self, holder: UserId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.lock.is_some_and(|(owner, _)| owner == holder) {
            inner.lock = None;
        }
        Ok(())
    }
}
