use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::TandemConfig;

const CONFIG_FILENAME: &str = "tandem.toml";

/// Load config from the given path.
pub fn load_config(path: &Path) -> anyhow::Result<TandemConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(cfg)
}

/// Discover and load config from standard locations, then apply `TANDEM_*`
/// environment overrides.
///
/// Search order:
/// 1. `./tandem.toml` (project-local)
/// 2. `~/.config/tandem/tandem.toml` (user-global)
///
/// Returns `TandemConfig::default()` (plus env overrides) if no config file
/// is found.
pub fn discover_and_load() -> TandemConfig {
    let mut cfg = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                TandemConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        TandemConfig::default()
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    if let Some(dir) = config_dir() {
        let p = dir.join(CONFIG_FILENAME);
        if p.exists() {
            return Some(p);
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/tandem/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tandem").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILENAME)
}

/// Apply `TANDEM_*` environment-variable overrides on top of `cfg`.
pub fn apply_env_overrides(cfg: &mut TandemConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut TandemConfig, get: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = get("TANDEM_BIND") {
        cfg.server.bind = bind;
    }
    if let Some(port) = get("TANDEM_PORT") {
        match port.parse() {
            Ok(port) => cfg.server.port = port,
            Err(_) => warn!(port, "ignoring unparsable TANDEM_PORT"),
        }
    }
    if let Some(url) = get("TANDEM_REDIS_URL") {
        cfg.redis.url = url;
    }
    if let Some(url) = get("TANDEM_DATABASE_URL") {
        cfg.database.url = url;
    }
    if let Some(secret) = get("TANDEM_JWT_SECRET") {
        cfg.auth.jwt_secret = Some(secret);
    }
    if let Some(base) = get("TANDEM_MEDIA_BASE_URL") {
        cfg.media.base_url = Some(base);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = TandemConfig::default();
        assert_eq!(cfg.server.port, 8760);
        assert_eq!(cfg.matchmaking.online_ttl_secs, 60);
        assert_eq!(cfg.matchmaking.heartbeat_interval_secs, 5);
        assert_eq!(cfg.matchmaking.match_ttl_secs, 300);
        assert_eq!(cfg.matchmaking.lock_ttl_secs, 10);
        assert_eq!(cfg.matchmaking.price_female, 30);
        assert_eq!(cfg.matchmaking.price_male, 5);
        assert_eq!(cfg.matchmaking.price_any, 0);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let cfg: TandemConfig = toml::from_str(
            r#"
            [server]
            port = 9100

            [matchmaking]
            price_female = 45
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.matchmaking.price_female, 45);
        assert_eq!(cfg.matchmaking.price_male, 5);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = TandemConfig::default();
        apply_overrides_from(&mut cfg, |key| match key {
            "TANDEM_PORT" => Some("9200".into()),
            "TANDEM_REDIS_URL" => Some("redis://cache:6379/2".into()),
            "TANDEM_JWT_SECRET" => Some("sekrit".into()),
            _ => None,
        });
        assert_eq!(cfg.server.port, 9200);
        assert_eq!(cfg.redis.url, "redis://cache:6379/2");
        assert_eq!(cfg.auth.jwt_secret.as_deref(), Some("sekrit"));
    }

    #[test]
    fn bad_port_override_is_ignored() {
        let mut cfg = TandemConfig::default();
        apply_overrides_from(&mut cfg, |key| {
            (key == "TANDEM_PORT").then(|| "not-a-port".into())
        });
        assert_eq!(cfg.server.port, 8760);
    }
}
