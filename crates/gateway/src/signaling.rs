use std::sync::Arc;

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use {
    tandem_accounts::UserProfile,
    tandem_protocol::{BusEvent, Role, ServerFrame, UserId, parse_room_name, room_topic},
};

use crate::state::AppState;

/// Deterministic offer/answer split: the numerically smaller id offers.
pub fn roles_for(me: UserId, other: UserId) -> (Role, Role) {
    if me < other {
        (Role::Offer, Role::Answer)
    } else {
        (Role::Answer, Role::Offer)
    }
}

/// Handle one signaling-room connection: role assignment, then opaque relay
/// of whatever the client sends, until either side leaves.
///
/// Content-agnostic on purpose — SDP and ICE payloads are never parsed.
pub async fn handle_signaling_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    user: UserProfile,
    room: String,
) {
    let user_id = user.id;
    let Some((user1, user2)) = parse_room_name(&room) else {
        info!(user_id, room = %room, "rejecting signaling connection: bad room name");
        return;
    };
    if user_id != user1 && user_id != user2 {
        warn!(user_id, room = %room, "rejecting signaling connection: not a participant");
        return;
    }
    let other = if user_id == user1 { user2 } else { user1 };

    let topic = room_topic(&room);
    let mut sub = match state.bus.subscribe(&topic).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(user_id, room = %room, error = %e, "bus subscribe failed");
            return;
        },
    };
    // Suppress our own relayed frames by session identity, so the same
    // payload echoed through the bus never loops back.
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(user_id, room = %room, "signaling session connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let send_frame = |frame: &ServerFrame| match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = client_tx.send(json);
        },
        Err(e) => warn!(user_id, error = %e, "frame serialization failed"),
    };

    // ── Role assignment ──────────────────────────────────────────────────
    let (own_role, other_role) = roles_for(user_id, other);
    send_frame(&ServerFrame::RoleAssignment { role: own_role });
    let announce = BusEvent::RoleAssignmentMessage {
        role: other_role,
        sender_id: user_id,
    };
    if let Err(e) = state.bus.publish(&topic, &announce).await {
        warn!(user_id, room = %room, error = %e, "role announcement failed");
    }

    // ── Relay loop ───────────────────────────────────────────────────────

    loop {
        tokio::select! {
            event = sub.recv() => {
                match event {
                    Some(BusEvent::RoleAssignmentMessage { role, sender_id }) => {
                        if sender_id != user_id {
                            send_frame(&ServerFrame::RoleAssignment { role });
                        }
                    },
                    Some(BusEvent::SignalMessage { message, sender }) => {
                        if sender != session_id {
                            match serde_json::to_string(&message) {
                                Ok(json) => {
                                    let _ = client_tx.send(json);
                                },
                                Err(e) => warn!(user_id, error = %e, "relay serialization failed"),
                            }
                        }
                    },
                    Some(BusEvent::MatchCancelled { from, .. }) => {
                        send_frame(&ServerFrame::MatchCancelled { from });
                    },
                    Some(BusEvent::ForceDisconnect { reason }) => {
                        info!(user_id, room = %room, ?reason, "signaling force disconnect");
                        break;
                    },
                    Some(_) => {},
                    None => break,
                }
            },
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Opaque relay: any JSON goes through untouched.
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(message) => {
                                let event = BusEvent::SignalMessage {
                                    message,
                                    sender: session_id.clone(),
                                };
                                if let Err(e) = state.bus.publish(&topic, &event).await {
                                    warn!(user_id, room = %room, error = %e, "signal relay failed");
                                }
                            },
                            Err(e) => {
                                warn!(user_id, error = %e, "dropping non-JSON signaling frame");
                            },
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        debug!(user_id, error = %e, "socket read error");
                        break;
                    },
                }
            },
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    let cancelled = BusEvent::MatchCancelled {
        from: user.username.clone(),
        user_id: Some(user_id),
    };
    if let Err(e) = state.bus.publish(&topic, &cancelled).await {
        warn!(user_id, room = %room, error = %e, "leave notification failed");
    }

    drop(sub);
    write_handle.abort();
    info!(user_id, room = %room, "signaling session closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn smaller_id_always_offers() {
        assert_eq!(roles_for(3, 12), (Role::Offer, Role::Answer));
        assert_eq!(roles_for(12, 3), (Role::Answer, Role::Offer));
    }
}
