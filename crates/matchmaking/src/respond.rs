use tracing::{error, info};

use {
    tandem_accounts::UserProfile,
    tandem_protocol::{Response, UserId, room_name},
    tandem_store::epoch_secs,
};

use crate::{Matchmaker, Result};

/// Outcome of one accept/reject response to a pending match.
#[derive(Debug)]
pub enum RespondOutcome {
    /// Both sides accepted; the room exists and the match is torn down.
    Success { partner: UserProfile, room: String },
    /// Caller accepted; the other side has not answered yet.
    WaitingForPartner,
    /// Caller rejected; both online sides are back in the queue.
    Rejected { partner: UserProfile },
    /// The other side's presence lapsed; the match was torn down.
    PartnerOffline { partner_name: String },
    /// No live match (pointer or record missing / expired).
    MatchExpired,
    /// The partner's account vanished; the match was torn down.
    PartnerNotFound,
    /// Both accepted but the room row could not be written. Not re-queued.
    RoomCreationFailed,
}

impl Matchmaker {
    /// Apply `user`'s response to their pending match.
    ///
    /// Expiry is lazy: a missing record (TTL or prior cleanup) reports
    /// [`RespondOutcome::MatchExpired`] and clears the stale pointer, so
    /// repeated responses against a dead match stay harmless.
    pub async fn respond(&self, user: UserId, response: Response) -> Result<RespondOutcome> {
        let Some(match_id) = self.store.get_active_match(user).await? else {
            return Ok(RespondOutcome::MatchExpired);
        };
        let Some(mut record) = self.store.get_match_record(&match_id).await? else {
            self.store.delete_active_match(user).await?;
            return Ok(RespondOutcome::MatchExpired);
        };
        let Some(other_id) = record.other_of(user) else {
            // Pointer names a record that does not involve us; self-heal.
            self.store.delete_active_match(user).await?;
            return Ok(RespondOutcome::MatchExpired);
        };

        if !self.store.is_online(other_id).await? {
            let partner_name = record.name_of(other_id).unwrap_or_default().to_string();
            self.cleanup_match(&record).await?;
            info!(user_id = user, partner_id = other_id, "partner went offline before responding");
            return Ok(RespondOutcome::PartnerOffline { partner_name });
        }

        let Some(partner) = self.directory.user(other_id).await? else {
            self.cleanup_match(&record).await?;
            return Ok(RespondOutcome::PartnerNotFound);
        };

        record.set_response(user, response, epoch_secs());

        match response {
            Response::Accept => {
                if record.response_of(other_id) == Some(Response::Accept) {
                    match self.rooms.create_between(user, other_id).await {
                        Ok(_) => {
                            self.cleanup_match(&record).await?;
                            let room = room_name(user, other_id);
                            info!(user_id = user, partner_id = other_id, room = %room, "mutual accept");
                            Ok(RespondOutcome::Success { partner, room })
                        },
                        Err(e) => {
                            error!(user_id = user, partner_id = other_id, error = %e, "room creation failed");
                            Ok(RespondOutcome::RoomCreationFailed)
                        },
                    }
                } else {
                    self.store.put_match_record(&record).await?;
                    Ok(RespondOutcome::WaitingForPartner)
                }
            },
            Response::Reject => {
                self.cleanup_match(&record).await?;
                if self.store.is_online(user).await? {
                    self.enqueue(user).await?;
                }
                if self.store.is_online(other_id).await? {
                    self.enqueue(other_id).await?;
                }
                info!(user_id = user, partner_id = other_id, "match rejected, both re-queued");
                Ok(RespondOutcome::Rejected { partner })
            },
        }
    }
}
