//! The matchmaking core: the atomic pairing engine, the two-phase
//! accept/reject state machine, disconnect cleanup, and admin queue scans.
//!
//! Components are stateless; every operation takes the acting user id and
//! runs against the shared [`MatchStore`] plus the durable account stores.
//! Cross-session effects (frames to the partner) are *returned* as outcomes
//! and reports — publishing them on the fan-out bus is the session
//! supervisor's job.

use std::sync::Arc;

use tracing::debug;

pub mod cleanup;
pub mod compat;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod respond;

pub use {
    cleanup::DisconnectReport,
    engine::PairOutcome,
    error::{Error, Result},
    monitor::{QueueEntryStatus, QueueStatus, UserStatus},
    respond::RespondOutcome,
};

use {
    tandem_accounts::{Directory, GemWallets, Rooms},
    tandem_config::MatchmakingConfig,
    tandem_protocol::{PreferredGender, UserId},
    tandem_store::{MatchRecord, MatchStore, epoch_secs},
};

/// Handle bundle for all matchmaking operations.
pub struct Matchmaker {
    store: Arc<dyn MatchStore>,
    directory: Directory,
    wallets: GemWallets,
    rooms: Rooms,
    config: MatchmakingConfig,
}

impl Matchmaker {
    pub fn new(
        store: Arc<dyn MatchStore>,
        directory: Directory,
        wallets: GemWallets,
        rooms: Rooms,
        config: MatchmakingConfig,
    ) -> Self {
        Self {
            store,
            directory,
            wallets,
            rooms,
            config,
        }
    }

    pub fn config(&self) -> &MatchmakingConfig {
        &self.config
    }

    /// Price of a pairing scan, keyed on the initiator's gender filter.
    pub fn price_for(&self, preferred: PreferredGender) -> i64 {
        match preferred {
            PreferredGender::Female => self.config.price_female,
            PreferredGender::Male => self.config.price_male,
            PreferredGender::Any => self.config.price_any,
        }
    }

    /// Join the waiting queue. Refreshes presence first; a user already
    /// committed to a match is not enqueued.
    pub async fn enqueue(&self, user: UserId) -> Result<bool> {
        if self.store.get_active_match(user).await?.is_some() {
            debug!(user_id = user, "enqueue skipped: active match");
            return Ok(false);
        }
        self.store.mark_online(user).await?;
        self.store.enqueue_waiting(user, epoch_secs()).await?;
        Ok(true)
    }

    pub async fn leave_queue(&self, user: UserId) -> Result<()> {
        self.store.dequeue_waiting(user).await?;
        Ok(())
    }

    /// Delete a match record and both participants' active-match pointers.
    pub(crate) async fn cleanup_match(&self, record: &MatchRecord) -> Result<()> {
        self.store.delete_match_record(&record.match_id).await?;
        if let Some((user1, user2)) = record.participants() {
            self.store.delete_active_match(user1).await?;
            self.store.delete_active_match(user2).await?;
        }
        debug!(match_id = %record.match_id, "match cleaned up");
        Ok(())
    }
}
