use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    tandem_accounts::{Directory, GemWallets, Rooms},
    tandem_config::TandemConfig,
    tandem_matchmaking::Matchmaker,
    tandem_protocol::UserId,
    tandem_store::{MatchStore, RedisStore, Ttls},
};

#[derive(Parser)]
#[command(name = "tandem", about = "Tandem — random voice-chat matchmaking gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Config file path (overrides discovery).
    #[arg(long, global = true, env = "TANDEM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve,
    /// Matchmaking queue administration.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Snapshot the waiting queue with per-entry liveness and match flags.
    Status,
    /// Remove offline users from the queue and clear their match pointers.
    Sweep,
    /// Show one user's presence / queue / match state.
    User { id: UserId },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TandemConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = tandem_config::load_config(path)?;
            tandem_config::apply_env_overrides(&mut config);
            config
        },
        None => tandem_config::discover_and_load(),
    };
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => tandem_gateway::run(config).await,
        Commands::Queue { action } => queue_command(config, action).await,
    }
}

/// Admin scans run out-of-process against the same shared stores the
/// gateway uses; they need no auth secret and no listener.
async fn queue_command(config: TandemConfig, action: QueueAction) -> anyhow::Result<()> {
    if config.redis.url == "memory" {
        anyhow::bail!("queue administration needs a shared redis store (redis.url is \"memory\")");
    }

    let pool = tandem_accounts::connect(&config.database.url).await?;
    let ttls = Ttls {
        online: Duration::from_secs(config.matchmaking.online_ttl_secs),
        match_ttl: Duration::from_secs(config.matchmaking.match_ttl_secs),
        lock: Duration::from_secs(config.matchmaking.lock_ttl_secs),
    };
    let store: Arc<dyn MatchStore> =
        Arc::new(RedisStore::connect(&config.redis.url, ttls).await?);
    let matchmaker = Matchmaker::new(
        store,
        Directory::new(pool.clone()),
        GemWallets::new(pool.clone()),
        Rooms::new(pool),
        config.matchmaking.clone(),
    );

    match action {
        QueueAction::Status => {
            let status = matchmaker.queue_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        },
        QueueAction::Sweep => {
            let swept = matchmaker.sweep_offline().await?;
            println!("swept {swept} stale queue entries");
        },
        QueueAction::User { id } => {
            let status = matchmaker.user_status(id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        },
    }
    Ok(())
}
