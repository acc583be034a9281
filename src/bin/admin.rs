//! Operator CLI for shortly.
//!
//! Shortens URLs and inspects or drives the outbox without running the worker.
//!
//! # Usage
//!
//! ```bash
//! # Shorten a URL
//! cargo run --bin admin -- shorten https://example.com/very/long/path --host short.ly
//!
//! # Outbox counters
//! cargo run --bin admin -- outbox status
//!
//! # Dispatch one batch now
//! cargo run --bin admin -- outbox dispatch
//!
//! # Make a processed message eligible for dispatch again
//! cargo run --bin admin -- outbox requeue 0f8fad5b-d9cb-469f-a165-70867728950e
//!
//! # Check database connection
//! cargo run --bin admin -- db check
//! ```
//!
//! # Environment Variables
//!
//! Same as the worker; see `shortly::config`.

use shortly::AppError;
use shortly::application::events::default_event_bus;
use shortly::application::outbox::OutboxDispatcher;
use shortly::application::services::{ShortenUrl, ShortenedUrlService};
use shortly::config::{self, Config};
use shortly::domain::repositories::OutboxRepository;
use shortly::infrastructure::persistence::{
    PgOutboxConsumerRepository, PgOutboxRepository, PgShortenedUrlRepository,
};
use shortly::server::{connect_cache, connect_database};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// CLI tool for operating shortly.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short URL
    Shorten {
        /// URL to shorten
        url: String,

        /// Host the short URL points at
        #[arg(long, default_value = "localhost:3000")]
        host: String,

        /// Scheme of the short URL
        #[arg(long, default_value = "https")]
        scheme: String,
    },

    /// Outbox operations
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// Show pending, processed and failed message counts
    Status,

    /// Dispatch one batch of pending messages
    Dispatch,

    /// Mark a processed message as pending again
    Requeue {
        /// Message id
        id: Uuid,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_from_env().context("Invalid configuration")?;
    let pool = connect_database(&config).await?;

    match cli.command {
        Commands::Shorten { url, host, scheme } => {
            handle_shorten(&config, &pool, url, host, scheme).await?
        }
        Commands::Outbox { action } => handle_outbox_action(&config, &pool, action).await?,
        Commands::Db { action } => handle_db_action(action, &pool).await?,
    }

    Ok(())
}

async fn handle_shorten(
    config: &Config,
    pool: &PgPool,
    url: String,
    host: String,
    scheme: String,
) -> Result<()> {
    let repository = Arc::new(PgShortenedUrlRepository::new(Arc::new(pool.clone())));
    let cache = connect_cache(config).await;
    let service = ShortenedUrlService::new(repository, config.code_settings()?, cache)
        .with_cache_ttl(config.cache_ttl_seconds);

    let shortened = service
        .create(ShortenUrl {
            original_url: url,
            scheme,
            host,
        })
        .await
        .map_err(|e| failure("Failed to shorten URL", e))?;

    println!("{}", "✅ Short URL created".green().bold());
    println!();
    println!("  Code:      {}", shortened.code.cyan());
    println!("  Short URL: {}", shortened.short_url.bright_green().bold());
    println!("  Original:  {}", shortened.original_url.bright_black());
    println!();

    Ok(())
}

async fn handle_outbox_action(config: &Config, pool: &PgPool, action: OutboxAction) -> Result<()> {
    let pool = Arc::new(pool.clone());
    let outbox = Arc::new(PgOutboxRepository::new(pool.clone()));

    match action {
        OutboxAction::Status => {
            let stats = outbox
                .stats()
                .await
                .map_err(|e| failure("Failed to read outbox stats", e))?;

            println!("{}", "📬 Outbox".bright_blue().bold());
            println!();
            println!("  Pending:   {}", stats.pending.to_string().yellow().bold());
            println!("  Processed: {}", stats.processed.to_string().bright_green().bold());
            println!("  Failed:    {}", stats.failed.to_string().red().bold());
            println!();
        }
        OutboxAction::Dispatch => {
            let cache = connect_cache(config).await;
            let consumers = Arc::new(PgOutboxConsumerRepository::new(pool));
            let bus = Arc::new(default_event_bus(consumers, cache)?);
            let dispatcher = OutboxDispatcher::new(outbox, bus, config.dispatcher_settings());

            println!("{}", "🚚 Dispatching outbox batch...".bright_blue());

            let report = dispatcher
                .run_once(&CancellationToken::new())
                .await
                .map_err(|e| failure("Dispatch failed", e))?;

            println!();
            println!("  Fetched:     {}", report.fetched);
            println!("  Delivered:   {}", report.delivered.to_string().bright_green());
            println!("  Failed:      {}", report.failed.to_string().red());
            println!("  Undecodable: {}", report.undecodable.to_string().red());
            println!();
        }
        OutboxAction::Requeue { id, yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Requeue outbox message {id}?"))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            let found = outbox
                .requeue(id)
                .await
                .map_err(|e| failure("Failed to requeue message", e))?;

            if found {
                println!("{}", "✅ Message requeued".green().bold());
            } else {
                println!("{}", "⚠️  No outbox message with this id".yellow());
            }
        }
    }

    Ok(())
}

/// Turns an [`AppError`] into a CLI error that keeps its code and details.
fn failure(context: &str, e: AppError) -> anyhow::Error {
    anyhow::anyhow!("{}: {} [{}] {}", context, e, e.code(), e.details())
}

async fn handle_db_action(action: DbAction, pool: &PgPool) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "🔍 Checking database connection...".bright_blue());

            let version: String = sqlx::query_scalar("SELECT version()")
                .fetch_one(pool)
                .await?;

            println!("{}", "✅ Database connection OK".green().bold());
            println!("  PostgreSQL: {}", version.bright_white());
        }
    }

    Ok(())
}
