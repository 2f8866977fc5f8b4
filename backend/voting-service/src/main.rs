use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;
use vote_events::{EventPublisher, EventSubscriber};

use voting_service::config::{Config, DatabaseConfig, StorageBackend};
use voting_service::handlers;
use voting_service::services::{forward_remote_changes, ChangePropagator};
use voting_service::workers::{start_score_reconciler, ReconcilerConfig};
use voting_service::{Stores, VotingCore};

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn connect_postgres(database: &DatabaseConfig) -> Result<Stores> {
    let pg_pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&database.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&pg_pool)
        .await
        .context("Failed to verify database connection")?;
    info!("Database pool created and verified");

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    Ok(Stores::postgres(pg_pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.app.log_format);

    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        storage = ?config.storage,
        "Starting voting-service"
    );

    let stores = match (&config.storage, &config.database) {
        (StorageBackend::Postgres, Some(database)) => connect_postgres(database).await?,
        (StorageBackend::Postgres, None) => {
            return Err(anyhow!("DATABASE_URL is required by STORAGE_BACKEND=postgres"))
        }
        (StorageBackend::Memory, _) => {
            warn!("Using in-memory stores, nothing survives a restart");
            Stores::in_memory()
        }
    };

    let (propagator, _dispatcher) = ChangePropagator::spawn(&config.propagation);

    let mut join_set: JoinSet<Result<()>> = JoinSet::new();

    // Cross-instance change bridge (optional)
    let remote = match &config.redis {
        Some(redis) => {
            let origin = Uuid::new_v4().to_string();
            let publisher =
                EventPublisher::with_channel(&redis.url, origin.clone(), redis.events_channel.clone())
                    .await
                    .context("Failed to connect change publisher to Redis")?;
            let subscriber =
                EventSubscriber::with_channel(&redis.url, origin.clone(), redis.events_channel.clone())
                    .await
                    .context("Failed to create change subscriber")?;
            let forwarding = forward_remote_changes(&subscriber, propagator.clone())
                .await
                .context("Failed to subscribe to remote changes")?;

            join_set.spawn(async move {
                forwarding
                    .await
                    .map_err(|e| anyhow!("Remote change forwarding panicked: {}", e))?;
                warn!("Remote change forwarding stopped, observers only see local changes");
                Ok(())
            });

            info!(origin = %origin, channel = %redis.events_channel, "Redis change bridge enabled");
            Some(publisher)
        }
        None => {
            info!("REDIS_URL not set, change propagation is local to this instance");
            None
        }
    };

    let core = VotingCore::new(stores, &config, propagator, remote);

    let reconciler_aggregator = core.aggregator.clone();
    let reconciler_config = ReconcilerConfig::from(&config.aggregation);
    join_set.spawn(async move {
        start_score_reconciler(reconciler_aggregator, reconciler_config).await;
        Ok(())
    });

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let app_core = web::Data::new(core);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(app_core.clone())
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();
    let server_handle = http_server.handle();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow!("HTTP server error: {}", e))
    });
    info!("HTTP server listening on http://{}", http_addr);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            result = &mut shutdown => {
                info!("Shutdown signal received");
                break result;
            }
            next = join_set.join_next() => match next {
                Some(Ok(Ok(()))) => info!("Task completed"),
                Some(Ok(Err(e))) => {
                    error!("Task failed: {:#}", e);
                    break Err(e);
                }
                Some(Err(e)) => {
                    error!("Task panicked: {:#}", e);
                    break Err(anyhow!("Task panicked: {}", e));
                }
                None => break Ok(()),
            }
        }
    };

    server_handle.stop(true).await;
    join_set.shutdown().await;
    info!("voting-service stopped");

    outcome
}
