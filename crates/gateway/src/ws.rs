use std::{sync::Arc, time::Duration};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    tandem_accounts::UserProfile,
    tandem_matchmaking::{PairOutcome, RespondOutcome},
    tandem_protocol::{
        BusEvent, ClientAction, DisconnectReason, GemErrorReason, Response, ServerFrame, UserId,
        room_topic, user_topic,
    },
};

use crate::state::AppState;

/// Handle one authenticated match-socket connection through its full
/// lifecycle: duplicate-session preemption → registration → message loop →
/// disconnect cleanup.
pub async fn handle_match_socket(socket: WebSocket, state: Arc<AppState>, user: UserProfile) {
    let user_id = user.id;
    let topic = user_topic(user_id);
    info!(user_id, username = %user.username, "match session connecting");

    // ── Duplicate-login preemption ───────────────────────────────────────
    // An earlier session for the same user still holds the fan-out topic;
    // tell it to go away and give it a moment to unwind.
    match state.bus.subscriber_count(&topic).await {
        Ok(existing) if existing > 0 => {
            info!(user_id, existing, "preempting previous session");
            let event = BusEvent::ForceDisconnect {
                reason: DisconnectReason::NewLogin,
            };
            if let Err(e) = state.bus.publish(&topic, &event).await {
                warn!(user_id, error = %e, "failed to publish force_disconnect");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        },
        Ok(_) => {},
        Err(e) => warn!(user_id, error = %e, "subscriber count check failed"),
    }

    // A user already committed to a match cannot open a fresh session.
    match state.store.get_active_match(user_id).await {
        Ok(None) => {},
        Ok(Some(match_id)) => {
            info!(user_id, match_id = %match_id, "rejecting connection: active match");
            return;
        },
        Err(e) => {
            warn!(user_id, error = %e, "active match check failed");
            return;
        },
    }

    let mut sub = match state.bus.subscribe(&topic).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(user_id, error = %e, "bus subscribe failed");
            return;
        },
    };
    if let Err(e) = state.store.mark_online(user_id).await {
        warn!(user_id, error = %e, "failed to mark online");
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards serialized frames to the WebSocket.
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Heartbeat ────────────────────────────────────────────────────────
    // Refresh presence every tick; a failed refresh is fatal for the
    // session, since scans elsewhere would already treat us as offline.
    let cancel = CancellationToken::new();
    let hb_cancel = cancel.clone();
    let hb_store = Arc::clone(&state.store);
    let hb_interval =
        Duration::from_secs(state.matchmaker.config().heartbeat_interval_secs.max(1));
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(hb_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = hb_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = hb_store.mark_online(user_id).await {
                        warn!(user_id, error = %e, "heartbeat refresh failed, closing session");
                        hb_cancel.cancel();
                        break;
                    }
                },
            }
        }
    });

    // ── Message loop ─────────────────────────────────────────────────────

    let session = MatchSession {
        state: Arc::clone(&state),
        user,
        tx: client_tx,
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = sub.recv() => {
                match event {
                    Some(event) => {
                        if session.handle_bus_event(event) {
                            break;
                        }
                    },
                    None => break,
                }
            },
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => session.handle_client_frame(&text).await,
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

    cancel.cancel();
    heartbeat.abort();

    match state.matchmaker.disconnect_cleanup(user_id).await {
        Ok(report) => {
            let cancelled = BusEvent::MatchCancelled {
                from: session.user.username.clone(),
                user_id: Some(user_id),
            };
            if let Some(partner) = report.match_partner {
                session.publish_to_user(partner, &cancelled).await;
            }
            for partner in &report.room_partners {
                session.publish_to_user(*partner, &cancelled).await;
            }
            for room in &report.rooms {
                let event = BusEvent::ForceDisconnect {
                    reason: DisconnectReason::MatchDisconnected,
                };
                if let Err(e) = state.bus.publish(&room_topic(room), &event).await {
                    warn!(user_id, room = %room, error = %e, "room force_disconnect publish failed");
                }
            }
        },
        Err(e) => warn!(user_id, error = %e, "disconnect cleanup failed"),
    }

    drop(sub);
    write_handle.abort();
    info!(user_id, "match session closed");
}

// ── Session ─────────────────────────────────────────────────────────────────

struct MatchSession {
    state: Arc<AppState>,
    user: UserProfile,
    tx: mpsc::UnboundedSender<String>,
}

impl MatchSession {
    fn send(&self, frame: &ServerFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => {
                let _ = self.tx.send(json);
            },
            Err(e) => warn!(user_id = self.user.id, error = %e, "frame serialization failed"),
        }
    }

    async fn publish_to_user(&self, user: UserId, event: &BusEvent) {
        if let Err(e) = self.state.bus.publish(&user_topic(user), event).await {
            // The store stays authoritative; a lost notification only costs
            // the peer a frame.
            warn!(
                user_id = self.user.id,
                target = user,
                error = %e,
                "bus publish failed"
            );
        }
    }

    async fn handle_client_frame(&self, text: &str) {
        let action: ClientAction = match serde_json::from_str(text) {
            Ok(action) => action,
            Err(e) => {
                warn!(user_id = self.user.id, error = %e, "ignoring unparsable frame");
                return;
            },
        };
        debug!(user_id = self.user.id, ?action, "client action");

        match action {
            ClientAction::JoinQueue => self.join_queue().await,
            ClientAction::LeaveQueue => {
                if let Err(e) = self.state.matchmaker.leave_queue(self.user.id).await {
                    warn!(user_id = self.user.id, error = %e, "leave_queue failed");
                }
            },
            ClientAction::Respond { partner, response } => self.respond(partner, response).await,
        }
    }

    async fn join_queue(&self) {
        if let Err(e) = self.state.matchmaker.enqueue(self.user.id).await {
            warn!(user_id = self.user.id, error = %e, "enqueue failed");
            return;
        }
        self.run_matching().await;
    }

    /// Drive one pairing scan, retrying once after lock contention.
    async fn run_matching(&self) {
        let user_id = self.user.id;
        let mut retried = false;
        loop {
            match self.state.matchmaker.find_and_match(user_id).await {
                Ok(PairOutcome::MatchCreated { partner }) => {
                    self.send(&ServerFrame::MatchFound {
                        partner: partner.username.clone(),
                        partner_image_url: self
                            .state
                            .absolute_image_url(partner.image_url.as_deref()),
                        partner_age: partner.age,
                        partner_gender: partner.gender,
                    });
                    // The partner's supervisor turns this into its own
                    // match_found, carrying our attributes.
                    self.publish_to_user(partner.id, &BusEvent::NotifyMatch {
                        user_id,
                        username: self.user.username.clone(),
                        image_url: self.user.image_url.clone(),
                        age: self.user.age,
                        gender: self.user.gender,
                    })
                    .await;
                    return;
                },
                Ok(PairOutcome::MatchingInProgress) => {
                    if retried {
                        return;
                    }
                    retried = true;
                    let backoff =
                        Duration::from_millis(self.state.matchmaker.config().retry_backoff_ms);
                    tokio::time::sleep(backoff).await;
                    // Only retry while we are still live and still waiting.
                    let still_wanted = async {
                        Ok::<bool, tandem_store::Error>(
                            self.state.store.is_online(user_id).await?
                                && self.state.store.queue_score(user_id).await?.is_some(),
                        )
                    }
                    .await;
                    match still_wanted {
                        Ok(true) => continue,
                        Ok(false) => return,
                        Err(e) => {
                            warn!(user_id, error = %e, "retry liveness check failed");
                            return;
                        },
                    }
                },
                Ok(PairOutcome::NotEnoughGems) => {
                    self.send(&ServerFrame::GemError {
                        reason: GemErrorReason::NotEnoughGems,
                    });
                    return;
                },
                // Silent to the client; queueing without a setting or a
                // candidate simply keeps waiting.
                Ok(PairOutcome::NoSetting) => {
                    debug!(user_id, "not matching: no setting saved");
                    return;
                },
                Ok(PairOutcome::AlreadyMatched) => {
                    debug!(user_id, "not matching: already matched");
                    return;
                },
                Ok(PairOutcome::NoMatch) => return,
                Err(e) => {
                    warn!(user_id, error = %e, "pairing scan failed");
                    return;
                },
            }
        }
    }

    async fn respond(&self, declared_partner: UserId, response: Response) {
        let user_id = self.user.id;
        debug!(user_id, partner = declared_partner, response = response.as_str(), "respond");

        let outcome = match self.state.matchmaker.respond(user_id, response).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id, error = %e, "respond failed");
                return;
            },
        };

        // The responder always gets the literal echo first.
        self.send(&ServerFrame::MatchResponse {
            result: response,
            from: self.user.username.clone(),
        });

        match outcome {
            RespondOutcome::Success { partner, room } => {
                self.send(&ServerFrame::MatchSuccess { room: room.clone() });
                self.publish_to_user(partner.id, &BusEvent::MatchSuccessNotification { room })
                    .await;
            },
            RespondOutcome::Rejected { partner } => {
                self.publish_to_user(partner.id, &BusEvent::MatchResult {
                    result: response,
                    from: self.user.username.clone(),
                })
                .await;
            },
            RespondOutcome::WaitingForPartner => {},
            RespondOutcome::PartnerOffline { partner_name } => {
                self.send(&ServerFrame::MatchCancelled { from: partner_name });
            },
            RespondOutcome::MatchExpired => {
                debug!(user_id, "respond on expired match");
            },
            RespondOutcome::PartnerNotFound => {
                warn!(user_id, partner = declared_partner, "respond: partner account gone");
            },
            RespondOutcome::RoomCreationFailed => {
                warn!(user_id, partner = declared_partner, "room creation failed");
            },
        }
    }

    /// Translate a fan-out event into a client frame. Returns `true` when
    /// the session must close.
    fn handle_bus_event(&self, event: BusEvent) -> bool {
        match event {
            BusEvent::NotifyMatch {
                username,
                image_url,
                age,
                gender,
                ..
            } => {
                self.send(&ServerFrame::MatchFound {
                    partner: username,
                    partner_image_url: self.state.absolute_image_url(image_url.as_deref()),
                    partner_age: age,
                    partner_gender: gender,
                });
                false
            },
            BusEvent::MatchResult { result, from } => {
                self.send(&ServerFrame::MatchResponse { result, from });
                false
            },
            BusEvent::MatchSuccessNotification { room } => {
                self.send(&ServerFrame::MatchSuccess { room });
                false
            },
            BusEvent::MatchCancelled { from, .. } => {
                self.send(&ServerFrame::MatchCancelled { from });
                false
            },
            BusEvent::ForceDisconnect { reason } => {
                info!(user_id = self.user.id, ?reason, "force disconnect");
                self.send(&ServerFrame::ForceDisconnect { reason });
                true
            },
            // Room-topic traffic never lands on a user topic.
            BusEvent::RoleAssignmentMessage { .. } | BusEvent::SignalMessage { .. } => false,
        }
    }
}
