use std::sync::Arc;

use {
    tandem_accounts::Directory,
    tandem_bus::FanoutBus,
    tandem_matchmaking::Matchmaker,
    tandem_store::MatchStore,
};

/// Shared gateway runtime state, wrapped in `Arc` for use across sessions.
pub struct AppState {
    pub store: Arc<dyn MatchStore>,
    pub bus: Arc<dyn FanoutBus>,
    pub matchmaker: Arc<Matchmaker>,
    pub directory: Directory,
    /// HS256 secret for verifying connection tokens.
    pub jwt_secret: String,
    /// Prefix for relative profile-image paths.
    pub media_base_url: Option<String>,
}

impl AppState {
    /// Make a stored image path presentable: absolute URLs pass through,
    /// relative paths get the configured media base glued on.
    pub fn absolute_image_url(&self, image: Option<&str>) -> Option<String> {
        let image = image?;
        if image.starts_with("http://") || image.starts_with("https://") {
            return Some(image.to_string());
        }
        match &self.media_base_url {
            Some(base) => Some(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                image.trim_start_matches('/')
            )),
            None => Some(image.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use {
        tandem_accounts::{Directory, GemWallets, Rooms},
        tandem_bus::MemoryBus,
        tandem_config::MatchmakingConfig,
        tandem_matchmaking::Matchmaker,
        tandem_store::{MatchStore, MemoryStore, Ttls},
    };

    use super::*;

    async fn state(media_base_url: Option<&str>) -> AppState {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:")
            .await
            .unwrap();
        tandem_accounts::init_schema(&pool).await.unwrap();
        let store: Arc<dyn MatchStore> = Arc::new(MemoryStore::new(Ttls::default()));
        AppState {
            store: Arc::clone(&store),
            bus: Arc::new(MemoryBus::new()),
            matchmaker: Arc::new(Matchmaker::new(
                store,
                Directory::new(pool.clone()),
                GemWallets::new(pool.clone()),
                Rooms::new(pool.clone()),
                MatchmakingConfig::default(),
            )),
            directory: Directory::new(pool),
            jwt_secret: "test".into(),
            media_base_url: media_base_url.map(Into::into),
        }
    }

    #[tokio::test]
    async fn image_urls_are_absolutized_against_the_media_base() {
        let state = state(Some("https://cdn.example.com/media/")).await;
        assert_eq!(
            state.absolute_image_url(Some("avatars/7.jpg")).as_deref(),
            Some("https://cdn.example.com/media/avatars/7.jpg")
        );
        assert_eq!(
            state
                .absolute_image_url(Some("https://elsewhere.example/x.png"))
                .as_deref(),
            Some("https://elsewhere.example/x.png")
        );
        assert_eq!(state.absolute_image_url(None), None);
    }

    #[tokio::test]
    async fn relative_paths_pass_through_without_a_media_base() {
        let state = state(None).await;
        assert_eq!(
            state.absolute_image_url(Some("avatars/7.jpg")).as_deref(),
            Some("avatars/7.jpg")
        );
    }
}
