use tracing::info;

use tandem_protocol::{UserId, room_name};

use crate::{Matchmaker, Result};

/// What a disconnect tore down, so the supervisor can notify the affected
/// peers over the fan-out bus.
#[derive(Debug, Default)]
pub struct DisconnectReport {
    /// Pending-match partner who was online, re-queued, and should receive
    /// `match_cancelled`.
    pub match_partner: Option<UserId>,
    /// Surviving partners of deleted rooms who were online and re-queued.
    pub room_partners: Vec<UserId>,
    /// Names of every deleted room; each room topic gets a
    /// `force_disconnect` so live signaling sessions shut down.
    pub rooms: Vec<String>,
}

impl Matchmaker {
    /// Tear down everything tied to a departing user: presence, queue
    /// membership, any pending match (re-queueing the online partner), and
    /// any durable rooms (re-queueing online survivors).
    pub async fn disconnect_cleanup(&self, user: UserId) -> Result<DisconnectReport> {
        let mut report = DisconnectReport::default();

        self.store.mark_offline(user).await?;
        self.store.dequeue_waiting(user).await?;

        if let Some(match_id) = self.store.get_active_match(user).await? {
            if let Some(record) = self.store.get_match_record(&match_id).await? {
                let other = record.other_of(user);
                self.cleanup_match(&record).await?;
                // Re-queue after cleanup: enqueue refuses users that still
                // hold an active-match pointer.
                if let Some(other) = other
                    && self.store.is_online(other).await?
                {
                    self.enqueue(other).await?;
                    report.match_partner = Some(other);
                }
            } else {
                self.store.delete_active_match(user).await?;
            }
        }

        for partner in self.rooms.delete_for_user(user).await? {
            report.rooms.push(room_name(user, partner));
            if self.store.is_online(partner).await? {
                self.enqueue(partner).await?;
                report.room_partners.push(partner);
            }
        }

        info!(
            user_id = user,
            match_partner = report.match_partner,
            rooms = report.rooms.len(),
            "disconnect cleanup complete"
        );
        Ok(report)
    }
}
