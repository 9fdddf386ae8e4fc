//! Config schema types (server, redis, database, auth, media, matchmaking).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub matchmaking: MatchmakingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8760,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL. The sentinel value `"memory"` selects the
    /// in-process store and bus backends (single-node development only).
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tandem.db".into(),
        }
    }
}

/// Authentication configuration. Token *verification* only; issuing tokens
/// is an external surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer. Usually supplied through
    /// `TANDEM_JWT_SECRET` rather than the config file.
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Prefix applied to relative profile-image paths so clients always see
    /// absolute URLs.
    pub base_url: Option<String>,
}

/// Tunables for the pairing engine, session heartbeats, and pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Presence TTL; a user with no refresh for this long counts as offline.
    pub online_ttl_secs: u64,
    /// Presence refresh cadence per connected session.
    pub heartbeat_interval_secs: u64,
    /// TTL of a match record and both active-match pointers.
    pub match_ttl_secs: u64,
    /// TTL of the global pairing lock (dead-holder recovery bound).
    pub lock_ttl_secs: u64,
    /// Sleep before the single retry after lock contention.
    pub retry_backoff_ms: u64,
    pub price_male: i64,
    pub price_female: i64,
    pub price_any: i64,
    /// Heartbeat staleness threshold used by admin queue scans only.
    pub stale_heartbeat_secs: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            online_ttl_secs: 60,
            heartbeat_interval_secs: 5,
            match_ttl_secs: 300,
            lock_ttl_secs: 10,
            retry_backoff_ms: 100,
            price_male: 5,
            price_female: 30,
            price_any: 0,
            stale_heartbeat_secs: 15,
        }
    }
}
