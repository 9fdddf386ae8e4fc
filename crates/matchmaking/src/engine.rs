use tracing::{debug, info, warn};

use {
    tandem_accounts::{MatchSetting, UserProfile},
    tandem_protocol::UserId,
    tandem_store::{MatchRecord, epoch_secs},
};

use crate::{Matchmaker, Result, compat};

/// Outcome of one pairing scan. Infrastructure failures surface as `Err`
/// instead; the supervisor logs those and tells the initiator nothing
/// specific.
#[derive(Debug)]
pub enum PairOutcome {
    /// Another scan holds the global lock; retry after a short backoff.
    MatchingInProgress,
    /// The initiator has no saved match setting and is ineligible.
    NoSetting,
    /// The initiator is already committed to a match.
    AlreadyMatched,
    /// No queued candidate satisfied both sides' filters.
    NoMatch,
    /// A partner was found but the initiator could not pay for the scan.
    NotEnoughGems,
    MatchCreated { partner: UserProfile },
}

impl Matchmaker {
    /// Scan the queue for the first mutually compatible partner and commit
    /// the pairing: debit the initiator, write the canonical match record
    /// and both active-match pointers, and dequeue both sides.
    ///
    /// The whole operation runs under the global advisory lock; contention
    /// returns [`PairOutcome::MatchingInProgress`] without waiting.
    pub async fn find_and_match(&self, initiator: UserId) -> Result<PairOutcome> {
        if !self.store.try_acquire_global_match_lock(initiator).await? {
            debug!(user_id = initiator, "pairing lock contended");
            return Ok(PairOutcome::MatchingInProgress);
        }

        let result = self.find_and_match_locked(initiator).await;

        // The lock must come off on every exit path; its TTL only covers us
        // against a crashed process.
        if let Err(e) = self.store.release_global_match_lock(initiator).await {
            warn!(user_id = initiator, error = %e, "failed to release pairing lock");
        }
        result
    }

    async fn find_and_match_locked(&self, initiator: UserId) -> Result<PairOutcome> {
        let Some(my_setting) = self.directory.setting(initiator).await? else {
            return Ok(PairOutcome::NoSetting);
        };
        let Some(me) = self.directory.user(initiator).await? else {
            return Ok(PairOutcome::NoSetting);
        };

        if self.store.get_active_match(initiator).await?.is_some() {
            return Ok(PairOutcome::AlreadyMatched);
        }

        let Some(partner) = self.find_compatible_partner(initiator, &me, &my_setting).await? else {
            return Ok(PairOutcome::NoMatch);
        };

        // Debit only now that a partner exists, so queueing with no
        // compatible candidate present never costs anything.
        let price = self.price_for(my_setting.preferred_gender);
        match self.wallets.debit(initiator, price).await {
            Ok(_) => {},
            Err(tandem_accounts::Error::InsufficientFunds { balance, price }) => {
                info!(user_id = initiator, balance, price, "pairing aborted: not enough gems");
                return Ok(PairOutcome::NotEnoughGems);
            },
            Err(e) => return Err(e.into()),
        }

        let record = MatchRecord::create(
            initiator,
            &me.username,
            partner.id,
            &partner.username,
            epoch_secs(),
        );
        self.store.put_match_record(&record).await?;
        self.store
            .set_active_match(initiator, &record.match_id)
            .await?;
        self.store
            .set_active_match(partner.id, &record.match_id)
            .await?;
        self.store.dequeue_waiting(initiator).await?;
        self.store.dequeue_waiting(partner.id).await?;

        info!(
            user_id = initiator,
            partner_id = partner.id,
            match_id = %record.match_id,
            "match created"
        );
        Ok(PairOutcome::MatchCreated { partner })
    }

    /// First queue member, in enqueue order, that passes both sides'
    /// filters. Stale entries (no presence) are removed as they are seen;
    /// candidates already committed to a match are left queued but skipped.
    async fn find_compatible_partner(
        &self,
        initiator: UserId,
        me: &UserProfile,
        my_setting: &MatchSetting,
    ) -> Result<Option<UserProfile>> {
        for candidate in self.store.range_waiting().await? {
            if candidate == initiator {
                continue;
            }
            if !self.store.is_online(candidate).await? {
                debug!(user_id = candidate, "dequeueing stale queue entry");
                self.store.dequeue_waiting(candidate).await?;
                continue;
            }
            if self.store.get_active_match(candidate).await?.is_some() {
                continue;
            }
            let Some(them) = self.directory.user(candidate).await? else {
                self.store.dequeue_waiting(candidate).await?;
                continue;
            };
            let Some(their_setting) = self.directory.setting(candidate).await? else {
                continue;
            };
            if compat::compatible(my_setting, me, &their_setting, &them) {
                return Ok(Some(them));
            }
        }
        Ok(None)
    }
}
