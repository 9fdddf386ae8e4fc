use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{Path, Query, State, WebSocketUpgrade},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use {
    tandem_accounts::{Directory, GemWallets, Rooms, UserProfile},
    tandem_bus::{FanoutBus, MemoryBus, RedisBus},
    tandem_config::TandemConfig,
    tandem_matchmaking::Matchmaker,
    tandem_store::{MatchStore, MemoryStore, RedisStore, Ttls},
};

use crate::{auth, signaling, state::AppState, ws};

/// Build the shared runtime state from config: database pool and schema,
/// Redis-backed store and bus (or the in-process pair for `redis.url =
/// "memory"`), and the matchmaker on top of them.
pub async fn build_state(config: &TandemConfig) -> anyhow::Result<Arc<AppState>> {
    let jwt_secret = config
        .auth
        .jwt_secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("auth.jwt_secret (or TANDEM_JWT_SECRET) must be set"))?;

    let pool = tandem_accounts::connect(&config.database.url).await?;

    let ttls = Ttls {
        online: Duration::from_secs(config.matchmaking.online_ttl_secs),
        match_ttl: Duration::from_secs(config.matchmaking.match_ttl_secs),
        lock: Duration::from_secs(config.matchmaking.lock_ttl_secs),
    };
    let (store, bus): (Arc<dyn MatchStore>, Arc<dyn FanoutBus>) = if config.redis.url == "memory" {
        warn!("redis.url = \"memory\": in-process state store and bus, single node only");
        (
            Arc::new(MemoryStore::new(ttls)),
            Arc::new(MemoryBus::new()),
        )
    } else {
        (
            Arc::new(RedisStore::connect(&config.redis.url, ttls).await?),
            Arc::new(RedisBus::connect(&config.redis.url).await?),
        )
    };

    let matchmaker = Arc::new(Matchmaker::new(
        Arc::clone(&store),
        Directory::new(pool.clone()),
        GemWallets::new(pool.clone()),
        Rooms::new(pool.clone()),
        config.matchmaking.clone(),
    ));

    Ok(Arc::new(AppState {
        store,
        bus,
        matchmaker,
        directory: Directory::new(pool),
        jwt_secret,
        media_base_url: config.media.base_url.clone(),
    }))
}

/// Run the gateway until ctrl-c.
pub async fn run(config: TandemConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "tandem gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/ws/match/", get(match_handler))
        .route("/ws/voicechat/{room_name}/", get(voicechat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn match_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let user = match authenticate(&state, &params).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    ws.on_upgrade(move |socket| ws::handle_match_socket(socket, state, user))
}

async fn voicechat_handler(
    ws: WebSocketUpgrade,
    Path(room_name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let user = match authenticate(&state, &params).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    ws.on_upgrade(move |socket| signaling::handle_signaling_socket(socket, state, user, room_name))
}

/// Resolve the `token` query parameter to a known user, or an error
/// response that rejects the upgrade. Anonymous connections never upgrade.
async fn authenticate(
    state: &Arc<AppState>,
    params: &HashMap<String, String>,
) -> Result<UserProfile, Response> {
    let user_id = auth::authenticate(params.get("token").map(String::as_str), &state.jwt_secret)
        .map_err(|e| {
            info!(error = %e, "rejecting anonymous connection");
            StatusCode::UNAUTHORIZED.into_response()
        })?;

    match state.directory.user(user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            warn!(user_id, "token names an unknown user");
            Err(StatusCode::UNAUTHORIZED.into_response())
        },
        Err(e) => {
            warn!(user_id, error = %e, "user lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        },
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
