//! Application setup and initialization
//!
//! This module contains all application initialization logic extracted from
//! main.rs for better organization and testability.

pub mod database;
pub mod routes;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sharebin_core::{Config, ShareStore};
use sharebin_db::PgShareStore;
use sharebin_ingest::{
    ensure_upload_dirs, sweep_stale_parts, IdentityVault, LimitResolver, QuotaLedger,
    SessionVault, UploadFinalizer,
};

use crate::state::{AppState, IngestState, SecurityConfig};

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    // Initialize telemetry first
    crate::telemetry::init_telemetry();

    tracing::info!("Configuration loaded and validated successfully");

    // Setup database
    let db_pool = database::setup_database(&config).await?;
    let store: Arc<dyn ShareStore> = Arc::new(PgShareStore::new(db_pool.clone()));

    // Setup the upload directory layout
    let upload_root = PathBuf::from(config.upload_dir());
    ensure_upload_dirs(&upload_root)
        .await
        .context("Failed to create upload directories")?;
    tracing::info!(upload_root = %upload_root.display(), "Upload directories ready");

    let ledger = QuotaLedger::new(store.clone(), upload_root.clone());
    let resolver = LimitResolver::new(ledger, config.limit_tier(false), config.limit_tier(true));
    let finalizer = UploadFinalizer::new(
        store.clone(),
        upload_root.clone(),
        config.anon_expiry_max_days(),
    );

    let state = Arc::new(AppState {
        security: SecurityConfig {
            jwt_secret: config.jwt_secret().to_string(),
            trusted_proxy_count: config.trusted_proxy_count(),
        },
        ingest: IngestState {
            resolver,
            finalizer,
            sessions: Arc::new(SessionVault::new()),
            identities: Arc::new(IdentityVault::new()),
            upload_root: upload_root.clone(),
        },
        store,
        db_pool: Some(db_pool),
        config: config.clone(),
    });

    spawn_part_sweeper(&config, upload_root);

    // Setup routes
    let router = routes::setup_routes(&config, state.clone()).await?;

    Ok((state, router))
}

/// Start the periodic task that reclaims abandoned upload partials.
fn spawn_part_sweeper(config: &Config, upload_root: PathBuf) {
    let interval_secs = config.part_sweep_interval_secs();
    if interval_secs == 0 {
        tracing::info!("Stale part sweep disabled");
        return;
    }

    let ttl = Duration::from_secs(config.part_ttl_secs());
    tracing::info!(
        interval_secs = interval_secs,
        ttl_secs = config.part_ttl_secs(),
        "Stale part sweep enabled"
    );
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match sweep_stale_parts(&upload_root, ttl).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed = removed, "Swept stale upload parts"),
                Err(e) => tracing::warn!(error = %e, "Stale part sweep failed"),
            }
        }
    });
}
