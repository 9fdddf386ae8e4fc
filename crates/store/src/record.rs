use serde::{Deserialize, Serialize};

use tandem_protocol::{Response, UserId, canonical_match_id};

/// A pending match between two users, stored as JSON in the registry under
/// its canonical id. `user1`/`user2` hold the decimal user ids with
/// `user1 < user2` in string order, matching the id layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub user1: String,
    pub user2: String,
    pub user1_name: String,
    pub user2_name: String,
    pub user1_response: Option<Response>,
    pub user2_response: Option<Response>,
    pub created_at: f64,
    pub updated_at: f64,
}

impl MatchRecord {
    /// Build a fresh PENDING record for the pair, canonicalizing slot order.
    pub fn create(a: UserId, a_name: &str, b: UserId, b_name: &str, now: f64) -> Self {
        let (user1, user1_name, user2, user2_name) = if a.to_string() <= b.to_string() {
            (a, a_name, b, b_name)
        } else {
            (b, b_name, a, a_name)
        };
        Self {
            match_id: canonical_match_id(a, b),
            user1: user1.to_string(),
            user2: user2.to_string(),
            user1_name: user1_name.to_string(),
            user2_name: user2_name.to_string(),
            user1_response: None,
            user2_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        let id = user.to_string();
        self.user1 == id || self.user2 == id
    }

    /// The other participant's id, if `user` is one of the pair.
    pub fn other_of(&self, user: UserId) -> Option<UserId> {
        let id = user.to_string();
        let other = if self.user1 == id {
            &self.user2
        } else if self.user2 == id {
            &self.user1
        } else {
            return None;
        };
        other.parse().ok()
    }

    pub fn name_of(&self, user: UserId) -> Option<&str> {
        let id = user.to_string();
        if self.user1 == id {
            Some(&self.user1_name)
        } else if self.user2 == id {
            Some(&self.user2_name)
        } else {
            None
        }
    }

    pub fn response_of(&self, user: UserId) -> Option<Response> {
        let id = user.to_string();
        if self.user1 == id {
            self.user1_response
        } else if self.user2 == id {
            self.user2_response
        } else {
            None
        }
    }

    /// Record `user`'s response and touch `updated_at`. No-op for a
    /// non-participant.
    pub fn set_response(&mut self, user: UserId, response: Response, now: f64) {
        let id = user.to_string();
        if self.user1 == id {
            self.user1_response = Some(response);
        } else if self.user2 == id {
            self.user2_response = Some(response);
        } else {
            return;
        }
        self.updated_at = now;
    }

    pub fn both_accepted(&self) -> bool {
        self.user1_response == Some(Response::Accept) && self.user2_response == Some(Response::Accept)
    }

    /// Both participant ids, `(user1, user2)` in record slot order.
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        Some((self.user1.parse().ok()?, self.user2.parse().ok()?))
    }
}
