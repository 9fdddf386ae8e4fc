//! Configuration loading and schema.
//!
//! Config file: `tandem.toml`, searched in `./` then `~/.config/tandem/`.
//! Every value can be overridden through `TANDEM_*` environment variables.

pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, find_or_default_config_path, load_config},
    schema::{
        AuthConfig, DatabaseConfig, MatchmakingConfig, MediaConfig, RedisConfig, ServerConfig,
        TandemConfig,
    },
};
