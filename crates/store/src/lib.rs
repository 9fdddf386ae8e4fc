//! Cross-process matchmaking state: presence, the waiting queue, the match
//! registry, active-match pointers, and the global pairing lock.
//!
//! All shared state lives behind the [`MatchStore`] trait so sessions on
//! different nodes observe the same world. [`redis::RedisStore`] is the
//! production backend; [`memory::MemoryStore`] backs tests and single-node
//! development.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod record;
pub mod redis;

pub use {
    self::redis::RedisStore,
    error::{Error, Result},
    memory::MemoryStore,
    record::MatchRecord,
};

use tandem_protocol::UserId;

/// Expiry knobs for store entries, normally derived from
/// `[matchmaking]` config.
#[derive(Debug, Clone, Copy)]
pub struct Ttls {
    /// Presence entry lifetime between heartbeats.
    pub online: Duration,
    /// Match record and active-match pointer lifetime.
    pub match_ttl: Duration,
    /// Global pairing lock lifetime (dead-holder recovery bound).
    pub lock: Duration,
}

impl Default for Ttls {
    fn default() -> Self {
        Self {
            online: Duration::from_secs(60),
            match_ttl: Duration::from_secs(300),
            lock: Duration::from_secs(10),
        }
    }
}

/// Seconds since the Unix epoch, as a queue score.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// The shared key-value state every session supervisor and pairing scan
/// coordinates through.
///
/// All operations are idempotent: marking an online user online extends the
/// TTL, dequeueing an absent user is a no-op, deleting a missing record
/// succeeds.
#[async_trait]
pub trait MatchStore: Send + Sync {
    // ── Presence ─────────────────────────────────────────────────────────

    /// Set (or refresh) the caller's presence entry with the online TTL.
    async fn mark_online(&self, user: UserId) -> Result<()>;

    /// Drop the presence entry immediately.
    async fn mark_offline(&self, user: UserId) -> Result<()>;

    async fn is_online(&self, user: UserId) -> Result<bool>;

    // ── Waiting queue ────────────────────────────────────────────────────

    /// Add to the waiting queue with the given score (enqueue epoch seconds).
    async fn enqueue_waiting(&self, user: UserId, score: f64) -> Result<()>;

    async fn dequeue_waiting(&self, user: UserId) -> Result<()>;

    /// All queued user ids in ascending score order.
    async fn range_waiting(&self) -> Result<Vec<UserId>>;

    /// The user's enqueue score, or `None` when not queued.
    async fn queue_score(&self, user: UserId) -> Result<Option<f64>>;

    async fn queue_len(&self) -> Result<u64>;

    // ── Active-match pointers ────────────────────────────────────────────

    async fn get_active_match(&self, user: UserId) -> Result<Option<String>>;

    async fn set_active_match(&self, user: UserId, match_id: &str) -> Result<()>;

    async fn delete_active_match(&self, user: UserId) -> Result<()>;

    // ── Match registry ───────────────────────────────────────────────────

    async fn put_match_record(&self, record: &MatchRecord) -> Result<()>;

    async fn get_match_record(&self, match_id: &str) -> Result<Option<MatchRecord>>;

    async fn delete_match_record(&self, match_id: &str) -> Result<()>;

    // ── Global pairing lock ──────────────────────────────────────────────

    /// Single-token advisory lock across all processes. Returns `false`
    /// without waiting when another holder owns it.
    async fn try_acquire_global_match_lock(&self, holder: UserId) -> Result<bool>;

    /// Owner-checked release; a non-owner release is a no-op.
    async fn release_global_match_lock(&self, holder: UserId) -> Result<()>;
}
