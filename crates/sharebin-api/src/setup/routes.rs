//! Route configuration and setup

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, head, post};
use axum::{Json, Router};
use serde::Serialize;
use sharebin_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::constants::API_PREFIX;
use crate::handlers;
use crate::state::AppState;

/// Setup all application routes
pub async fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    let app = public_routes(state.clone())
        .merge(ingest_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::HEAD,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    // Browser clients drive the resumable protocol from response headers, so
    // they must be readable cross-origin.
    let cors = if config.cors_origins().contains(&"*".to_string()) {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
            .expose_headers(Any)
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            config.cors_origins().iter().map(|o| o.parse()).collect();

        CorsLayer::new()
            .allow_origin(origins.unwrap_or_default())
            .allow_methods(methods)
            .allow_headers(Any)
            .expose_headers(Any)
    };
    Ok(cors)
}

/// Public operational routes (no upload semantics)
fn public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/live", get(liveness_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
}

/// Upload routes. The default body limit is disabled: the ingest engine
/// enforces the per-caller ceilings chunk by chunk instead.
fn ingest_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            &format!("{}/shares", API_PREFIX),
            post(handlers::upload::create_share),
        )
        .route(
            &format!("{}/uploads", API_PREFIX),
            post(handlers::resumable::create_session),
        )
        .route(
            &format!("{}/uploads/{{id}}", API_PREFIX),
            head(handlers::resumable::session_status)
                .patch(handlers::resumable::append_to_session)
                .delete(handlers::resumable::delete_session),
        )
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthCheckResponse {
    status: String,
    database: String,
    storage: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    const TIMEOUT: Duration = Duration::from_secs(5);

    let mut response = HealthCheckResponse {
        status: "healthy".to_string(),
        database: "unknown".to_string(),
        storage: "unknown".to_string(),
    };

    let mut overall_healthy = true;

    // Check database using the pool directly with timeout
    match state.db_pool.as_ref() {
        Some(pool) => {
            match tokio::time::timeout(TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
                Ok(Ok(_)) => {
                    response.database = "healthy".to_string();
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Database health check failed");
                    response.database = format!("unhealthy: {}", e);
                    overall_healthy = false;
                }
                Err(_) => {
                    tracing::error!("Database health check timed out");
                    response.database = "timeout".to_string();
                    overall_healthy = false;
                }
            }
        }
        None => response.database = "not_configured".to_string(),
    }

    // Check the upload root; storage issues degrade but don't fail overall
    // health, uploads in flight keep their already-open file handles.
    match tokio::fs::try_exists(&state.ingest.upload_root).await {
        Ok(true) => response.storage = "healthy".to_string(),
        Ok(false) => {
            tracing::warn!(path = %state.ingest.upload_root.display(), "Upload root is missing");
            response.storage = "missing".to_string();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            response.storage = format!("degraded: {}", e);
        }
    }

    if !overall_healthy {
        response.status = "unhealthy".to_string();
    }

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    const TIMEOUT: Duration = Duration::from_secs(5);

    let mut response = serde_json::json!({
        "status": "ready",
        "database": "unknown"
    });

    let mut overall_ready = true;

    match state.db_pool.as_ref() {
        Some(pool) => {
            match tokio::time::timeout(TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
                Ok(Ok(_)) => {
                    response["database"] = serde_json::json!("ready");
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Database readiness check failed");
                    response["database"] = serde_json::json!(format!("not_ready: {}", e));
                    overall_ready = false;
                }
                Err(_) => {
                    tracing::error!("Database readiness check timed out");
                    response["database"] = serde_json::json!("timeout");
                    overall_ready = false;
                }
            }
        }
        None => response["database"] = serde_json::json!("not_configured"),
    }

    let status_code = if overall_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}
