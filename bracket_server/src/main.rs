//! Tournament bracket server.
//!
//! Serves the bracket HTTP API over a PostgreSQL-backed engine and runs the
//! round scheduler next to it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use bracket_engine::events::{BroadcastSink, LogAchievementNotifier};
use bracket_engine::{BracketEngine, Database, EventNotifier, PgBracketStore};
use bracket_server::{
    api, config::ServerConfig, events, locks::TournamentLocks, logging, metrics,
    scheduler::RoundScheduler,
};
use pico_args::Arguments;
use tokio::sync::watch;

const HELP: &str = "\
Run the tournament bracket server

USAGE:
  bracket_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  SCHEDULER_ENABLED        Run the round scheduler [default: true]
  SCHEDULER_INTERVAL_SECS  Seconds between scheduler sweeps [default: 300]
  METRICS_BIND             Prometheus scrape address [default: disabled]
  BATTLE_TIMEOUT_MINUTES   Battle time limit [default: 30]
  SHUFFLE_FIRST_ROUND      Shuffle round 1 entry order [default: true]
  QUESTION_POOL_TIMEOUT_SECS  Question pool read timeout [default: 5]
  RUST_LOG                 Log filter [default: info,sqlx=warn]
";

/// Buffered events per subscriber before the relay starts dropping
const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!("Prometheus metrics exposed at http://{}/metrics", addr);
    }

    tracing::info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    db.apply_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to apply schema: {}", e))?;
    tracing::info!("Database connected successfully");

    let store = PgBracketStore::new(Arc::new(db.pool().clone()))
        .with_question_timeout(config.engine.question_pool_timeout());

    let sink = BroadcastSink::new(EVENT_CHANNEL_CAPACITY);
    let relay = events::spawn_event_relay(sink.subscribe());

    let engine = BracketEngine::new(
        Arc::new(store),
        EventNotifier::new(Arc::new(sink)),
        Arc::new(LogAchievementNotifier),
        config.engine.clone(),
    );
    let locks = TournamentLocks::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.scheduler.enabled {
        let scheduler =
            RoundScheduler::new(engine.clone(), locks.clone(), config.scheduler.interval());
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        tracing::info!("Round scheduler disabled");
        None
    };

    let state = api::AppState::new(engine, locks).with_database(db.clone());
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    tracing::info!("Shutting down server...");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    // The router and scheduler held the last engine clones, closing the channel
    match relay.await {
        Ok(relayed) => tracing::info!("Relayed {} event(s)", relayed),
        Err(e) => tracing::warn!("Event relay ended abnormally: {}", e),
    }
    db.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
