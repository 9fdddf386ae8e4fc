#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end matchmaking flows over the in-memory store and an in-memory
//! SQLite database, exercising the same state transitions the production
//! Redis-backed deployment goes through.

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;

use {
    tandem_accounts::{Directory, GemWallets, Rooms},
    tandem_config::MatchmakingConfig,
    tandem_matchmaking::{Matchmaker, PairOutcome, RespondOutcome},
    tandem_protocol::Response,
    tandem_store::{MatchStore, MemoryStore, Ttls},
};

struct World {
    matchmaker: Matchmaker,
    store: Arc<MemoryStore>,
    wallets: GemWallets,
    rooms: Rooms,
    pool: SqlitePool,
}

async fn world() -> World {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    tandem_accounts::init_schema(&pool).await.unwrap();
    let store = Arc::new(MemoryStore::new(Ttls::default()));
    let matchmaker = Matchmaker::new(
        Arc::clone(&store) as Arc<dyn MatchStore>,
        Directory::new(pool.clone()),
        GemWallets::new(pool.clone()),
        Rooms::new(pool.clone()),
        MatchmakingConfig::default(),
    );
    World {
        matchmaker,
        store,
        wallets: GemWallets::new(pool.clone()),
        rooms: Rooms::new(pool.clone()),
        pool,
    }
}

#[allow(clippy::too_many_arguments)]
async fn seed_user(
    world: &World,
    id: i64,
    username: &str,
    age: i64,
    gender: &str,
    preferred: &str,
    age_min: i64,
    age_max: i64,
    balance: i64,
) {
    sqlx::query("INSERT INTO users (id, username, age, gender) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(username)
        .bind(age)
        .bind(gender)
        .execute(&world.pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO match_settings (user_id, preferred_gender, age_min, age_max) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(preferred)
    .bind(age_min)
    .bind(age_max)
    .execute(&world.pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO gem_wallets (user_id, balance) VALUES (?, ?)")
        .bind(id)
        .bind(balance)
        .execute(&world.pool)
        .await
        .unwrap();
}

/// The canonical pair from the product flows: u1 pays for a female match,
/// u2 matches males for free-ish.
async fn seed_standard_pair(world: &World) {
    seed_user(world, 1, "minsu", 25, "male", "female", 20, 30, 50).await;
    seed_user(world, 2, "jiyeon", 24, "female", "male", 18, 40, 100).await;
}

#[tokio::test]
async fn happy_mutual_accept_creates_room_and_debits_once() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    let PairOutcome::MatchCreated { partner } = outcome else {
        panic!("expected MatchCreated, got {outcome:?}");
    };
    assert_eq!(partner.id, 2);
    assert_eq!(partner.username, "jiyeon");

    // Exactly one debit at the female price.
    assert_eq!(world.wallets.balance(1).await.unwrap(), 20);
    assert_eq!(world.wallets.balance(2).await.unwrap(), 100);

    // Both committed, neither queued.
    assert_eq!(
        world.store.get_active_match(1).await.unwrap().as_deref(),
        Some("1:2")
    );
    assert_eq!(
        world.store.get_active_match(2).await.unwrap().as_deref(),
        Some("1:2")
    );
    assert!(world.store.range_waiting().await.unwrap().is_empty());

    let outcome = world.matchmaker.respond(1, Response::Accept).await.unwrap();
    assert!(matches!(outcome, RespondOutcome::WaitingForPartner));

    let outcome = world.matchmaker.respond(2, Response::Accept).await.unwrap();
    let RespondOutcome::Success { partner, room } = outcome else {
        panic!("expected Success, got {outcome:?}");
    };
    assert_eq!(partner.id, 1);
    assert_eq!(room, "1_2");

    // Room exists; match state is fully torn down.
    assert!(world.rooms.find_between(1, 2).await.unwrap().is_some());
    assert_eq!(world.store.get_active_match(1).await.unwrap(), None);
    assert_eq!(world.store.get_active_match(2).await.unwrap(), None);
    assert!(world.store.get_match_record("1:2").await.unwrap().is_none());
}

#[tokio::test]
async fn pairing_is_symmetric_except_for_who_pays() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();

    // u2 initiates instead; the canonical record id is identical.
    let outcome = world.matchmaker.find_and_match(2).await.unwrap();
    assert!(matches!(outcome, PairOutcome::MatchCreated { .. }));
    assert_eq!(
        world.store.get_active_match(1).await.unwrap().as_deref(),
        Some("1:2")
    );

    // The initiator pays their own preference's price (male → 5).
    assert_eq!(world.wallets.balance(2).await.unwrap(), 95);
    assert_eq!(world.wallets.balance(1).await.unwrap(), 50);
}

#[tokio::test]
async fn reject_requeues_both_and_keeps_the_debit() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    world.matchmaker.find_and_match(1).await.unwrap();

    let outcome = world.matchmaker.respond(2, Response::Reject).await.unwrap();
    let RespondOutcome::Rejected { partner } = outcome else {
        panic!("expected Rejected, got {outcome:?}");
    };
    assert_eq!(partner.id, 1);

    let mut queued = world.store.range_waiting().await.unwrap();
    queued.sort_unstable();
    assert_eq!(queued, vec![1, 2]);
    assert_eq!(world.store.get_active_match(1).await.unwrap(), None);
    assert_eq!(world.store.get_active_match(2).await.unwrap(), None);
    assert!(world.store.get_match_record("1:2").await.unwrap().is_none());

    // No refund.
    assert_eq!(world.wallets.balance(1).await.unwrap(), 20);
    assert!(world.rooms.find_between(1, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn insufficient_gems_leaves_partner_queued_and_charges_nothing() {
    let world = world().await;
    seed_user(&world, 1, "minsu", 25, "male", "female", 20, 30, 10).await;
    seed_user(&world, 2, "jiyeon", 24, "female", "male", 18, 40, 0).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::NotEnoughGems));

    assert_eq!(world.wallets.balance(1).await.unwrap(), 10);
    assert!(world.store.get_match_record("1:2").await.unwrap().is_none());
    assert_eq!(world.store.get_active_match(1).await.unwrap(), None);
    assert!(world.store.queue_score(2).await.unwrap().is_some());
}

#[tokio::test]
async fn matching_any_gender_is_free_even_without_a_wallet_row() {
    let world = world().await;
    seed_user(&world, 1, "minsu", 25, "male", "any", 18, 40, 0).await;
    seed_user(&world, 2, "jiyeon", 24, "female", "any", 18, 40, 0).await;
    // Strip u1's wallet row entirely; the debit path must create it.
    sqlx::query("DELETE FROM gem_wallets WHERE user_id = 1")
        .execute(&world.pool)
        .await
        .unwrap();
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::MatchCreated { .. }));
    assert_eq!(world.wallets.balance(1).await.unwrap(), 0);
}

#[tokio::test]
async fn stale_queue_entries_are_removed_during_the_scan() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    // u2 dropped without a clean disconnect: presence gone, queue entry left.
    world.store.mark_offline(2).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::NoMatch));

    // Swept inline, and no money moved.
    assert_eq!(world.store.queue_score(2).await.unwrap(), None);
    assert_eq!(world.wallets.balance(1).await.unwrap(), 50);
}

#[tokio::test]
async fn committed_candidates_are_skipped_but_not_dequeued() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    world.store.set_active_match(2, "2:9").await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::NoMatch));
    assert!(world.store.queue_score(2).await.unwrap().is_some());
}

#[tokio::test]
async fn earliest_compatible_candidate_wins() {
    let world = world().await;
    seed_user(&world, 1, "minsu", 25, "male", "female", 18, 40, 50).await;
    seed_user(&world, 2, "jiyeon", 24, "female", "any", 18, 40, 0).await;
    seed_user(&world, 3, "sora", 26, "female", "any", 18, 40, 0).await;
    world.matchmaker.enqueue(1).await.unwrap();
    // Explicit scores: sora has waited longer than jiyeon.
    world.store.mark_online(2).await.unwrap();
    world.store.mark_online(3).await.unwrap();
    world.store.enqueue_waiting(3, 100.0).await.unwrap();
    world.store.enqueue_waiting(2, 200.0).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    let PairOutcome::MatchCreated { partner } = outcome else {
        panic!("expected MatchCreated, got {outcome:?}");
    };
    assert_eq!(partner.id, 3);
}

#[tokio::test]
async fn filters_that_do_not_overlap_never_match() {
    let world = world().await;
    // jiyeon's age filter excludes minsu (25 > 24).
    seed_user(&world, 1, "minsu", 25, "male", "female", 20, 30, 50).await;
    seed_user(&world, 2, "jiyeon", 24, "female", "male", 18, 24, 0).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::NoMatch));
    // Incompatible candidates stay queued.
    assert!(world.store.queue_score(2).await.unwrap().is_some());
}

#[tokio::test]
async fn missing_setting_and_existing_match_short_circuit() {
    let world = world().await;
    sqlx::query("INSERT INTO users (id, username, age, gender) VALUES (5, 'bare', 30, 'other')")
        .execute(&world.pool)
        .await
        .unwrap();
    world.store.mark_online(5).await.unwrap();
    world.store.enqueue_waiting(5, 1.0).await.unwrap();

    let outcome = world.matchmaker.find_and_match(5).await.unwrap();
    assert!(matches!(outcome, PairOutcome::NoSetting));

    seed_user(&world, 6, "busy", 30, "male", "any", 18, 60, 0).await;
    world.store.set_active_match(6, "6:9").await.unwrap();
    let outcome = world.matchmaker.find_and_match(6).await.unwrap();
    assert!(matches!(outcome, PairOutcome::AlreadyMatched));
}

#[tokio::test]
async fn contended_lock_reports_matching_in_progress() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.store.try_acquire_global_match_lock(99).await.unwrap();

    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::MatchingInProgress));

    // Once the other holder releases, the scan goes through.
    world.store.release_global_match_lock(99).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    let outcome = world.matchmaker.find_and_match(1).await.unwrap();
    assert!(matches!(outcome, PairOutcome::MatchCreated { .. }));
}

#[tokio::test]
async fn responding_to_a_dead_match_expires_and_heals_the_pointer() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    world.matchmaker.find_and_match(1).await.unwrap();

    // Record evicted (TTL in production); the pointer lingers.
    world.store.delete_match_record("1:2").await.unwrap();

    let outcome = world.matchmaker.respond(1, Response::Accept).await.unwrap();
    assert!(matches!(outcome, RespondOutcome::MatchExpired));
    assert_eq!(world.store.get_active_match(1).await.unwrap(), None);

    // Repeating the response stays MatchExpired (idempotent on a dead match).
    let outcome = world.matchmaker.respond(1, Response::Accept).await.unwrap();
    assert!(matches!(outcome, RespondOutcome::MatchExpired));
}

#[tokio::test]
async fn responding_when_partner_lapsed_cancels_the_match() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    world.matchmaker.find_and_match(1).await.unwrap();
    world.store.mark_offline(2).await.unwrap();

    let outcome = world.matchmaker.respond(1, Response::Accept).await.unwrap();
    let RespondOutcome::PartnerOffline { partner_name } = outcome else {
        panic!("expected PartnerOffline, got {outcome:?}");
    };
    assert_eq!(partner_name, "jiyeon");
    assert!(world.store.get_match_record("1:2").await.unwrap().is_none());
    assert_eq!(world.store.get_active_match(2).await.unwrap(), None);
}

#[tokio::test]
async fn disconnect_during_half_accept_requeues_the_survivor() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    world.matchmaker.find_and_match(1).await.unwrap();
    let outcome = world.matchmaker.respond(1, Response::Accept).await.unwrap();
    assert!(matches!(outcome, RespondOutcome::WaitingForPartner));

    let report = world.matchmaker.disconnect_cleanup(1).await.unwrap();
    assert_eq!(report.match_partner, Some(2));
    assert!(report.rooms.is_empty());

    assert!(world.store.get_match_record("1:2").await.unwrap().is_none());
    assert_eq!(world.store.get_active_match(2).await.unwrap(), None);
    assert!(world.store.queue_score(2).await.unwrap().is_some());
    assert_eq!(world.store.queue_score(1).await.unwrap(), None);
    assert!(!world.store.is_online(1).await.unwrap());
}

#[tokio::test]
async fn disconnect_tears_down_rooms_and_requeues_survivors() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.store.mark_online(2).await.unwrap();
    world.rooms.create_between(1, 2).await.unwrap();

    let report = world.matchmaker.disconnect_cleanup(1).await.unwrap();
    assert_eq!(report.rooms, vec!["1_2".to_string()]);
    assert_eq!(report.room_partners, vec![2]);
    assert_eq!(report.match_partner, None);

    assert!(world.rooms.find_between(1, 2).await.unwrap().is_none());
    assert!(world.store.queue_score(2).await.unwrap().is_some());
}

#[tokio::test]
async fn offline_room_partners_are_not_requeued() {
    let world = world().await;
    seed_standard_pair(&world).await;
    world.rooms.create_between(1, 2).await.unwrap();

    let report = world.matchmaker.disconnect_cleanup(1).await.unwrap();
    assert_eq!(report.rooms, vec!["1_2".to_string()]);
    assert!(report.room_partners.is_empty());
    assert_eq!(world.store.queue_score(2).await.unwrap(), None);
}

#[tokio::test]
async fn queue_status_and_sweep_reflect_liveness() {
    let world = world().await;
    seed_user(&world, 1, "a", 25, "male", "any", 18, 40, 0).await;
    seed_user(&world, 2, "b", 25, "male", "any", 18, 40, 0).await;
    seed_user(&world, 3, "c", 25, "male", "any", 18, 40, 0).await;
    world.matchmaker.enqueue(1).await.unwrap();
    world.matchmaker.enqueue(2).await.unwrap();
    world.matchmaker.enqueue(3).await.unwrap();
    world.store.mark_offline(2).await.unwrap();
    world.store.set_active_match(3, "3:9").await.unwrap();

    let status = world.matchmaker.queue_status().await.unwrap();
    assert_eq!(status.queue_count, 3);
    assert_eq!(status.active_match_users, 1);
    let offline: Vec<_> = status
        .queue_users
        .iter()
        .filter(|u| !u.online)
        .map(|u| u.user_id)
        .collect();
    assert_eq!(offline, vec![2]);

    assert_eq!(world.matchmaker.sweep_offline().await.unwrap(), 1);
    let mut queued = world.store.range_waiting().await.unwrap();
    queued.sort_unstable();
    assert_eq!(queued, vec![1, 3]);

    let status = world.matchmaker.user_status(1).await.unwrap();
    assert!(status.online && status.in_queue && !status.has_active_match);
}
