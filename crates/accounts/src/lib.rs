//! Durable relational state: the user directory and match settings (read-only
//! to the matchmaking core), gem wallets, and matched rooms.
//!
//! Account registration, profile editing, settings writes, and wallet top-ups
//! are external surfaces; this crate only exposes what the core consumes.

use std::{
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod directory;
pub mod error;
pub mod rooms;
pub mod wallet;

pub use {
    directory::{Directory, MatchSetting, UserProfile},
    error::{Error, Result},
    rooms::{Room, Rooms},
    wallet::GemWallets,
};

/// Open (creating if missing) the SQLite database at `url`.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create the tables the core reads and writes. Users and match settings are
/// populated externally; the definitions here only guarantee the shape.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id        INTEGER PRIMARY KEY,
            username  TEXT NOT NULL UNIQUE,
            image_url TEXT,
            age       INTEGER NOT NULL,
            gender    TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS match_settings (
            user_id          INTEGER PRIMARY KEY REFERENCES users(id),
            preferred_gender TEXT NOT NULL,
            age_min          INTEGER NOT NULL,
            age_max          INTEGER NOT NULL,
            radius_km        INTEGER,
            updated_at       INTEGER NOT NULL DEFAULT (strftime('%s','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS gem_wallets (
            user_id    INTEGER PRIMARY KEY REFERENCES users(id),
            balance    INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS matched_rooms (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            user1_id   INTEGER NOT NULL,
            user2_id   INTEGER NOT NULL,
            matched_at INTEGER NOT NULL,
            UNIQUE (user1_id, user2_id)
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
