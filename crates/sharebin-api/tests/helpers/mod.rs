//! Test helpers: build AppState and router over the in-memory store.
//!
//! Run from workspace root: `cargo test -p sharebin-api --test upload_test`
//! or `cargo test -p sharebin-api`. These tests need no external services;
//! the Postgres-backed store has its own Docker-gated suite in
//! store_pg_test.rs.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::connect_info::MockConnectInfo;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use sharebin_api::auth::create_token;
use sharebin_api::constants;
use sharebin_api::setup::routes;
use sharebin_api::state::{AppState, IngestState, SecurityConfig};
use sharebin_core::models::LimitTier;
use sharebin_core::{BaseConfig, Config, IngestConfig, MemoryShareStore, ShareStore};
use sharebin_ingest::{
    ensure_upload_dirs, IdentityVault, LimitResolver, QuotaLedger, SessionVault, UploadFinalizer,
    TMP_DIR,
};
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-key-min-32-characters-long-for-testing";

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server, store, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryShareStore>,
    pub upload_root: PathBuf,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Names of permanent files in the upload root, tmp excluded.
    pub fn permanent_files(&self) -> Vec<String> {
        list_files(&self.upload_root)
    }

    /// Names of `.part` files still sitting in the temp directory.
    pub fn partial_files(&self) -> Vec<String> {
        list_files(&self.upload_root.join(TMP_DIR))
    }
}

fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read upload directory")
        .filter_map(|entry| {
            let entry = entry.expect("Failed to read directory entry");
            if entry.file_type().expect("Failed to stat entry").is_file() {
                Some(entry.file_name().to_string_lossy().into_owned())
            } else {
                None
            }
        })
        .collect();
    names.sort();
    names
}

/// Setup a test app with roomy limits that ordinary uploads never hit.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_tiers(
        LimitTier {
            max_file_bytes: 64 * 1024,
            quota_bytes: 256 * 1024,
        },
        LimitTier {
            max_file_bytes: 1024 * 1024,
            quota_bytes: 4 * 1024 * 1024,
        },
    )
    .await
}

/// Setup a test app with explicit per-tier ceilings, for limit tests.
pub async fn setup_test_app_with_tiers(anon: LimitTier, account: LimitTier) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let upload_root = temp_dir.path().to_path_buf();
    ensure_upload_dirs(&upload_root)
        .await
        .expect("Failed to create upload directories");

    let store = Arc::new(MemoryShareStore::new());
    let store_dyn: Arc<dyn ShareStore> = store.clone();
    let config = create_test_config(anon, account);

    let ledger = QuotaLedger::new(store_dyn.clone(), upload_root.clone());
    let resolver = LimitResolver::new(ledger, config.limit_tier(false), config.limit_tier(true));
    let finalizer = UploadFinalizer::new(
        store_dyn.clone(),
        upload_root.clone(),
        config.anon_expiry_max_days(),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        store: store_dyn,
        db_pool: None,
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
    });

    let app = routes::setup_routes(&config, state)
        .await
        .expect("Failed to setup routes")
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        store,
        upload_root,
        _temp_dir: temp_dir,
    }
}

fn create_test_config(anon: LimitTier, account: LimitTier) -> Config {
    let base = BaseConfig {
        server_port: 4000,
        cors_origins: vec!["*".to_string()],
        db_max_connections: 5,
        db_timeout_seconds: 30,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiry_hours: 24,
        environment: "test".to_string(),
    };
    Config(Box::new(IngestConfig {
        base,
        database_url: "postgresql://unused-in-memory-tests".to_string(),
        upload_dir: "./uploads".to_string(),
        anon_max_file_bytes: anon.max_file_bytes,
        anon_quota_bytes: anon.quota_bytes,
        account_max_file_bytes: account.max_file_bytes,
        account_quota_bytes: account.quota_bytes,
        // One trusted proxy, so tests pin the source via X-Forwarded-For.
        trusted_proxy_count: 1,
        anon_expiry_max_days: 7,
        part_ttl_secs: 86400,
        part_sweep_interval_secs: 0,
    }))
}

/// Bearer token for an account, signed with the test secret.
pub fn auth_token(user_id: Uuid) -> String {
    create_token(user_id, TEST_JWT_SECRET, 24).expect("Failed to sign test token")
}

/// Minimal valid form for a single-shot upload: the required `type` field
/// plus one file part.
pub fn share_form(filename: &str, content: &[u8]) -> MultipartForm {
    let part = Part::bytes(Bytes::from(content.to_vec()))
        .file_name(filename)
        .mime_type("application/octet-stream");
    MultipartForm::new()
        .add_text("type", "FILE")
        .add_part("file", part)
}

/// Encode key/value pairs into an `Upload-Metadata` header value.
pub fn upload_metadata(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{} {}", key, STANDARD.encode(value)))
        .collect::<Vec<_>>()
        .join(",")
}
