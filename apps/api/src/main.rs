mod applications;
mod auth;
mod cache;
mod categories;
mod config;
mod db;
mod errors;
mod forms;
mod jobs;
mod models;
mod payments;
mod profiles;
mod routes;
mod shortlist;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::jwks::JwksVerifier;
use crate::cache::UserCache;
use crate::categories::seed_default_categories;
use crate::config::{Config, StorageBackend};
use crate::db::{create_pool, run_migrations};
use crate::errors::set_expose_error_detail;
use crate::payments::stripe::StripeClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::cloudinary::CloudinaryAdapter;
use crate::storage::s3::S3StorageAdapter;
use crate::storage::{StorageAdapter, UploadContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tradesman API v{}", env!("CARGO_PKG_VERSION"));
    set_expose_error_detail(!config.is_production());

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    if config.seed_on_startup {
        seed_default_categories(&db)
            .await
            .context("Failed to seed default categories")?;
    }

    // Initialize the user cache
    let cache = if config.enable_cache {
        let client = redis::Client::open(config.redis_url.clone())?;
        info!("Redis user cache enabled");
        UserCache::new(client)
    } else {
        UserCache::disabled()
    };

    // Initialize session verification
    let sessions = Arc::new(JwksVerifier::new(
        &config.hanko_api_url,
        config.hanko_audience.clone(),
    )?);
    info!("Session tokens verified against {}", config.hanko_api_url);

    // Initialize file storage
    let storage: Arc<dyn StorageAdapter> = match config.storage_backend {
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().context("S3 storage selected but not configured")?;
            Arc::new(S3StorageAdapter::from_config(s3).await)
        }
        StorageBackend::Cloudinary => {
            let cloudinary = config
                .cloudinary
                .clone()
                .context("Cloudinary storage selected but not configured")?;
            Arc::new(CloudinaryAdapter::new(cloudinary, config.storage_folder.clone())?)
        }
    };
    info!("Storage backend: {:?}", config.storage_backend);

    // Initialize payments
    let payments = Arc::new(StripeClient::new(config.stripe_secret_key.clone())?);

    // Build app state
    let state = AppState {
        db,
        sessions,
        storage,
        upload_ctx: UploadContext {
            environment: config.app_env.clone(),
            ..UploadContext::default()
        },
        payments,
        cache,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
