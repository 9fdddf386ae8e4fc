use serde::Serialize;
use tracing::info;

use {
    tandem_protocol::UserId,
    tandem_store::epoch_secs,
};

use crate::{Matchmaker, Result};

/// One waiting-queue entry as seen by an admin scan.
#[derive(Debug, Serialize)]
pub struct QueueEntryStatus {
    pub user_id: UserId,
    pub online: bool,
    pub has_match: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub queue_count: u64,
    /// Queued users holding an active-match pointer (a transient state
    /// during pairing; matches count two users each).
    pub active_match_users: u64,
    pub estimated_match_count: u64,
    /// Entries that are offline and have sat past the staleness threshold;
    /// candidates for [`Matchmaker::sweep_offline`].
    pub stale_count: u64,
    pub queue_users: Vec<QueueEntryStatus>,
}

#[derive(Debug, Serialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub online: bool,
    pub in_queue: bool,
    pub has_active_match: bool,
}

impl Matchmaker {
    /// Snapshot the waiting queue with per-entry liveness and match flags.
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let now = epoch_secs();
        let stale_cutoff = now - self.config.stale_heartbeat_secs as f64;

        let mut queue_users = Vec::new();
        let mut active_match_users = 0;
        let mut stale_count = 0;
        for user_id in self.store.range_waiting().await? {
            let online = self.store.is_online(user_id).await?;
            let has_match = self.store.get_active_match(user_id).await?.is_some();
            if has_match {
                active_match_users += 1;
            }
            if !online
                && self
                    .store
                    .queue_score(user_id)
                    .await?
                    .is_some_and(|score| score < stale_cutoff)
            {
                stale_count += 1;
            }
            queue_users.push(QueueEntryStatus {
                user_id,
                online,
                has_match,
            });
        }

        Ok(QueueStatus {
            queue_count: self.store.queue_len().await?,
            active_match_users,
            estimated_match_count: active_match_users / 2,
            stale_count,
            queue_users,
        })
    }

    /// Remove every offline user from the queue and clear their pointers.
    /// Returns how many entries were swept.
    pub async fn sweep_offline(&self) -> Result<u64> {
        let mut swept = 0;
        for user_id in self.store.range_waiting().await? {
            if !self.store.is_online(user_id).await? {
                self.store.dequeue_waiting(user_id).await?;
                self.store.delete_active_match(user_id).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            info!(swept, "swept offline users from queue");
        }
        Ok(swept)
    }

    pub async fn user_status(&self, user: UserId) -> Result<UserStatus> {
        Ok(UserStatus {
            user_id: user,
            online: self.store.is_online(user).await?,
            in_queue: self.store.queue_score(user).await?.is_some(),
            has_active_match: self.store.get_active_match(user).await?.is_some(),
        })
    }
}
