//! Application state shared across request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::FromRef;
use sharebin_core::{Config, ShareStore};
use sharebin_ingest::{IdentityVault, LimitResolver, SessionVault, UploadFinalizer};
use sqlx::PgPool;

/// Identity and network trust settings used when resolving the caller.
#[derive(Clone)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    /// Number of proxies in front of the service whose forwarded headers
    /// are trusted. 0 means forwarded headers are ignored.
    pub trusted_proxy_count: usize,
}

/// Everything the ingestion handlers need to move bytes and finalize shares.
#[derive(Clone)]
pub struct IngestState {
    pub resolver: LimitResolver,
    pub finalizer: UploadFinalizer,
    pub sessions: Arc<SessionVault>,
    pub identities: Arc<IdentityVault>,
    pub upload_root: PathBuf,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ShareStore>,
    /// None when the state is backed by an in-memory store, as in tests.
    pub db_pool: Option<PgPool>,
    pub security: SecurityConfig,
    pub ingest: IngestState,
}

impl FromRef<Arc<AppState>> for SecurityConfig {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.security.clone()
    }
}

impl FromRef<Arc<AppState>> for IngestState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.ingest.clone()
    }
}

// Axum requires shared state to be Send + Sync; fail at compile time if a
// field ever stops being so.
#[allow(dead_code)]
fn _assert_app_state_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AppState>();
}
