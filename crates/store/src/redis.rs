use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};

use tandem_protocol::UserId;

use crate::{MatchRecord, MatchStore, Result, Ttls};

const QUEUE_KEY: &str = "match_queue";
const LOCK_KEY: &str = "global_match_lock";

/// Owner-checked lock release: delete only when the stored token still
/// belongs to the caller.
const RELEASE_LOCK: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

fn online_key(user: UserId) -> String {
    format!("user_online:{user}")
}

fn active_match_key(user: UserId) -> String {
    format!("user_matches:{user}")
}

fn record_key(match_id: &str) -> String {
    format!("match_requests:{match_id}")
}

/// Redis-backed [`MatchStore`]. All entries carry TTLs so crashed sessions
/// and dead lock holders age out on their own.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    ttls: Ttls,
    release_lock: Script,
}

impl RedisStore {
    pub async fn connect(url: &str, ttls: Ttls) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, ttls))
    }

    pub fn new(conn: ConnectionManager, ttls: Ttls) -> Self {
        Self {
            conn,
            ttls,
            release_lock: Script::new(RELEASE_LOCK),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl MatchStore for RedisStore {
    async fn mark_online(&self, user: UserId) -> Result<()> {
        let _: () = redis::cmd("SET")
            .arg(online_key(user))
            .arg("1")
            .arg("EX")
            .arg(self.ttls.online.as_secs())
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn mark_offline(&self, user: UserId) -> Result<()> {
        let _: () = redis::cmd("DEL")
            .arg(online_key(user))
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn is_online(&self, user: UserId) -> Result<bool> {
        let exists: bool = redis::cmd("EXISTS")
            .arg(online_key(user))
            .query_async(&mut self.conn())
            .await?;
        Ok(exists)
    }

    async fn enqueue_waiting(&self, user: UserId, score: f64) -> Result<()> {
        let _: () = redis::cmd("ZADD")
            .arg(QUEUE_KEY)
            .arg(score)
            .arg(user)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn dequeue_waiting(&self, user: UserId) -> Result<()> {
        let _: () = redis::cmd("ZREM")
            .arg(QUEUE_KEY)
            .arg(user)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn range_waiting(&self) -> Result<Vec<UserId>> {
        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg(QUEUE_KEY)
            .arg(0)
            .arg(-1)
            .query_async(&mut self.conn())
            .await?;
        Ok(members.iter().filter_map(|m| m.parse().ok()).collect())
    }

    async fn queue_score(&self, user: UserId) -> Result<Option<f64>> {
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(QUEUE_KEY)
            .arg(user)
            .query_async(&mut self.conn())
            .await?;
        Ok(score)
    }

    async fn queue_len(&self) -> Result<u64> {
        let len: u64 = redis::cmd("ZCARD")
            .arg(QUEUE_KEY)
            .query_async(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn get_active_match(&self, user: UserId) -> Result<Option<String>> {
        let match_id: Option<String> = redis::cmd("GET")
            .arg(active_match_key(user))
            .query_async(&mut self.conn())
            .await?;
        Ok(match_id)
    }

    async fn set_active_match(&self, user: UserId, match_id: &str) -> Result<()> {
        let _: () = redis::cmd("SET")
            .arg(active_match_key(user))
            .arg(match_id)
            .arg("EX")
            .arg(self.ttls.match_ttl.as_secs())
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn delete_active_match(&self, user: UserId) -> Result<()> {
        let _: () = redis::cmd("DEL")
            .arg(active_match_key(user))
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn put_match_record(&self, record: &MatchRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let _: () = redis::cmd("SET")
            .arg(record_key(&record.match_id))
            .arg(json)
            .arg("EX")
            .arg(self.ttls.match_ttl.as_secs())
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn get_match_record(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        let json: Option<String> = redis::cmd("GET")
            .arg(record_key(match_id))
            .query_async(&mut self.conn())
            .await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete_match_record(&self, match_id: &str) -> Result<()> {
        let _: () = redis::cmd("DEL")
            .arg(record_key(match_id))
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn try_acquire_global_match_lock(&self, holder: UserId) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(LOCK_KEY)
            .arg(holder)
            .arg("NX")
            .arg("EX")
            .arg(self.ttls.lock.as_secs())
            .query_async(&mut self.conn())
            .await?;
        Ok(reply.is_some())
    }

    async fn release_global_match_lock(&self, holder: UserId) -> Result<()> {
        let _: i64 = self
            .release_lock
            .key(LOCK_KEY)
            .arg(holder.to_string())
            .invoke_async(&mut self.conn())
            .await?;
        Ok(())
    }
}
