//! Spa Clients Worker - client directory and spreadsheet import service
//!
//! This worker connects to NATS and handles messages from the frontend.

mod auth;
mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::handlers::AppState;
use crate::services::directory::ClientDirectory;
use crate::services::documents::{DocumentService, LocalBlobStore};
use crate::services::import_processor::{ImportProcessor, ImportSettings};
use crate::services::job_ledger::NatsStatusPublisher;
use crate::services::store::create_store;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,spa_clients_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => migrate(&config).await,
        Command::Serve => serve(config).await,
    }
}

async fn migrate(config: &Config) -> Result<()> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    let pool = db::create_pool(url).await?;
    info!("Connected to PostgreSQL");

    db::run_migrations(&pool).await?;
    info!("Database migrations complete");
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Spa Clients Worker...");

    let store = create_store(&config).await?;
    info!("Store initialized: {}", store.name());

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let publisher = Arc::new(NatsStatusPublisher::new(nats_client.clone()));
    let imports = Arc::new(ImportProcessor::new(
        Arc::clone(&store),
        publisher,
        ImportSettings::from_config(&config),
    ));
    info!(
        "Import processor ready (background processing: {})",
        config.background_processing
    );

    let blobs = Arc::new(LocalBlobStore::new(
        &config.documents_dir,
        &config.documents_base_url,
    ));
    let documents = Arc::new(DocumentService::new(blobs, config.max_upload_bytes));
    info!("Document store at {}", config.documents_dir);

    let state = AppState {
        directory: Arc::new(ClientDirectory::new(store)),
        imports,
        documents,
        jwt_secret: config.jwt_secret.clone(),
    };

    // Start message handlers
    let handler_result = handlers::start_handlers(nats_client, state).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}
