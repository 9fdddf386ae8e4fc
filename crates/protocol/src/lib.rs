//! Matchmaking and signaling wire protocol definitions.
//!
//! All communication uses JSON frames over WebSocket. Three frame families:
//! - [`ClientAction`] — client → gateway commands on the match socket
//! - [`ServerFrame`]  — gateway → client push on either socket
//! - [`BusEvent`]     — supervisor ↔ supervisor fan-out envelopes
//!
//! Signaling payloads (SDP offers/answers, ICE candidates) are deliberately
//! opaque: they cross the wire as raw `serde_json::Value` and are never
//! inspected.

use serde::{Deserialize, Serialize};

/// Stable external user identifier.
pub type UserId = i64;

// ── Demographics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Gender filter carried by a match setting. `Any` disables the check on
/// that side only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredGender {
    Male,
    Female,
    Any,
}

impl PreferredGender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Any => "any",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether this filter admits the given gender.
    pub fn admits(&self, gender: Gender) -> bool {
        match self {
            Self::Any => true,
            Self::Male => gender == Gender::Male,
            Self::Female => gender == Gender::Female,
        }
    }
}

// ── Responses and roles ──────────────────────────────────────────────────────

/// A user's answer to a pending match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Accept,
    Reject,
}

impl Response {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

/// WebRTC negotiation role. The numerically smaller user id of a room always
/// takes `Offer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemErrorReason {
    NotEnoughGems,
    NoWallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    NewLogin,
    MatchDisconnected,
}

// ── Client actions ───────────────────────────────────────────────────────────

/// Inbound frame on the match socket. Unknown actions fail to parse and are
/// logged and dropped by the session supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    JoinQueue,
    LeaveQueue,
    Respond { partner: UserId, response: Response },
}

// ── Server frames ────────────────────────────────────────────────────────────

/// Outbound frame, pushed to the client over either socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    MatchFound {
        partner: String,
        partner_image_url: Option<String>,
        partner_age: i64,
        partner_gender: Gender,
    },
    MatchResponse {
        result: Response,
        from: String,
    },
    MatchSuccess {
        room: String,
    },
    MatchCancelled {
        from: String,
    },
    GemError {
        reason: GemErrorReason,
    },
    ForceDisconnect {
        reason: DisconnectReason,
    },
    RoleAssignment {
        role: Role,
    },
}

// ── Bus events ───────────────────────────────────────────────────────────────

/// Envelope carried over the cross-process fan-out bus. Delivery is
/// at-most-once and best-effort; the state store remains the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// A pairing scan on another node selected this user; carries the
    /// initiator's display attributes for the local `match_found` frame.
    NotifyMatch {
        user_id: UserId,
        username: String,
        image_url: Option<String>,
        age: i64,
        gender: Gender,
    },
    /// Echo of a partner's accept/reject to the other side of a match.
    MatchResult {
        result: Response,
        from: String,
    },
    MatchSuccessNotification {
        room: String,
    },
    MatchCancelled {
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
    },
    ForceDisconnect {
        reason: DisconnectReason,
    },
    /// Room-topic role announcement; receivers ignore their own `sender_id`.
    RoleAssignmentMessage {
        role: Role,
        sender_id: UserId,
    },
    /// Opaque signaling relay; receivers ignore their own `sender` session.
    SignalMessage {
        message: serde_json::Value,
        sender: String,
    },
}

// ── Identifiers and topics ───────────────────────────────────────────────────

/// Canonical match id: the two decimal user ids joined by `:`, smaller
/// *string* first. String order (not numeric) keeps the id stable with the
/// stored record fields, which are compared as strings.
pub fn canonical_match_id(a: UserId, b: UserId) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b { format!("{a}:{b}") } else { format!("{b}:{a}") }
}

/// Canonical room name: the two user ids joined by `_`, numerically smaller
/// first. Doubles as the signaling topic suffix.
pub fn room_name(a: UserId, b: UserId) -> String {
    format!("{}_{}", a.min(b), a.max(b))
}

/// Parse the two participant ids out of a room name.
pub fn parse_room_name(name: &str) -> Option<(UserId, UserId)> {
    let (a, b) = name.split_once('_')?;
    let (a, b) = (a.parse().ok()?, b.parse().ok()?);
    if a < b { Some((a, b)) } else { None }
}

/// Per-user fan-out topic.
pub fn user_topic(user: UserId) -> String {
    format!("user_{user}")
}

/// Per-room signaling topic.
pub fn room_topic(room: &str) -> String {
    format!("voicechat_{room}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn client_actions_parse_by_action_tag() {
        let action: ClientAction =
            serde_json::from_str(r#"{"action":"respond","partner":7,"response":"accept"}"#)
                .unwrap();
        assert_eq!(action, ClientAction::Respond {
            partner: 7,
            response: Response::Accept,
        });

        let action: ClientAction = serde_json::from_str(r#"{"action":"join_queue"}"#).unwrap();
        assert_eq!(action, ClientAction::JoinQueue);

        assert!(serde_json::from_str::<ClientAction>(r#"{"action":"dance"}"#).is_err());
    }

    #[test]
    fn server_frames_carry_snake_case_type_tags() {
        let json = serde_json::to_value(ServerFrame::MatchFound {
            partner: "mina".into(),
            partner_image_url: None,
            partner_age: 24,
            partner_gender: Gender::Female,
        })
        .unwrap();
        assert_eq!(json["type"], "match_found");
        assert_eq!(json["partner"], "mina");
        assert_eq!(json["partner_gender"], "female");

        let json = serde_json::to_value(ServerFrame::GemError {
            reason: GemErrorReason::NotEnoughGems,
        })
        .unwrap();
        assert_eq!(json["type"], "gem_error");
        assert_eq!(json["reason"], "not_enough_gems");

        let json = serde_json::to_value(ServerFrame::ForceDisconnect {
            reason: DisconnectReason::NewLogin,
        })
        .unwrap();
        assert_eq!(json["reason"], "new_login");
    }

    #[test]
    fn bus_events_round_trip_through_json() {
        let event = BusEvent::RoleAssignmentMessage {
            role: Role::Answer,
            sender_id: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"role_assignment_message""#));
        let back: BusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn match_cancelled_omits_absent_user_id() {
        let json = serde_json::to_value(BusEvent::MatchCancelled {
            from: "mina".into(),
            user_id: None,
        })
        .unwrap();
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn match_ids_are_string_canonical() {
        assert_eq!(canonical_match_id(3, 12), "12:3");
        assert_eq!(canonical_match_id(12, 3), "12:3");
        assert_eq!(canonical_match_id(3, 9), "3:9");
    }

    #[test]
    fn room_names_are_numerically_canonical() {
        assert_eq!(room_name(12, 3), "3_12");
        assert_eq!(room_name(3, 12), "3_12");
        assert_eq!(parse_room_name("3_12"), Some((3, 12)));
        assert_eq!(parse_room_name("12_3"), None);
        assert_eq!(parse_room_name("fish"), None);
    }

    #[test]
    fn preferred_gender_any_admits_everyone() {
        assert!(PreferredGender::Any.admits(Gender::Other));
        assert!(PreferredGender::Female.admits(Gender::Female));
        assert!(!PreferredGender::Female.admits(Gender::Male));
    }
}
