//! Worker runtime: storage, cache, event bus, scheduled jobs and the health
//! endpoint, with graceful shutdown.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::app_router;
use crate::application::events::default_event_bus;
use crate::application::outbox::OutboxDispatcher;
use crate::config::Config;
use crate::infrastructure::cache::{CacheService, NullCache, RedisCache};
use crate::infrastructure::persistence::{PgOutboxConsumerRepository, PgOutboxRepository};
use crate::jobs::{DispatcherStatus, JobHost, PROCESS_OUTBOX_MESSAGES_JOB, ProcessOutboxMessagesJob};
use crate::state::AppState;

/// Opens the connection pool with the configured limits.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");
    Ok(pool)
}

/// Redis when configured and reachable, [`NullCache`] otherwise.
pub async fn connect_cache(config: &Config) -> Arc<dyn CacheService> {
    let Some(redis_url) = &config.redis_url else {
        tracing::info!("Cache disabled (NullCache)");
        return Arc::new(NullCache::new());
    };

    match RedisCache::connect(redis_url, config.cache_ttl_seconds).await {
        Ok(redis) => {
            tracing::info!("Cache enabled (Redis)");
            Arc::new(redis)
        }
        Err(e) => {
            tracing::warn!("Failed to connect to Redis: {}. Using NullCache.", e);
            Arc::new(NullCache::new())
        }
    }
}

/// Runs the worker until Ctrl+C or SIGTERM.
///
/// On shutdown the HTTP server stops accepting connections, the job host is
/// cancelled, and in-flight job runs finish before the pool is closed.
///
/// # Errors
///
/// Returns an error if the database is unreachable, migrations fail, the
/// configuration names an invalid schedule, or the listener cannot bind.
pub async fn run(config: Config) -> Result<()> {
    let pool = connect_database(&config).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let cache = connect_cache(&config).await;

    let pool = Arc::new(pool);
    let outbox = Arc::new(PgOutboxRepository::new(pool.clone()));
    let consumers = Arc::new(PgOutboxConsumerRepository::new(pool.clone()));

    let bus = Arc::new(default_event_bus(consumers, cache.clone())?);
    let dispatcher = Arc::new(OutboxDispatcher::new(
        outbox.clone(),
        bus,
        config.dispatcher_settings(),
    ));
    let status = Arc::new(DispatcherStatus::new());

    let mut host = JobHost::new();
    for settings in &config.jobs {
        match settings.name.as_str() {
            PROCESS_OUTBOX_MESSAGES_JOB => host.register(
                Arc::new(ProcessOutboxMessagesJob::new(
                    dispatcher.clone(),
                    status.clone(),
                )),
                settings,
            )?,
            other => tracing::warn!(job = %other, "Unknown job in configuration, ignoring"),
        }
    }

    let cancel = CancellationToken::new();
    let jobs = host.spawn(cancel.clone());
    tracing::info!("Started {} background job(s)", jobs.len());

    let app = app_router(AppState::new(outbox, cache, status));

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    for job in jobs {
        if let Err(e) = job.await {
            tracing::error!("Job task ended abnormally: {}", e);
        }
    }

    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
