//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use sharebin_core::models;

/// Returns the OpenAPI spec served at `/api/openapi.json`.
pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sharebin API",
        version = "0.1.0",
        description = "File share hosting API (v0). Supports single-shot multipart uploads and resumable offset-addressed upload sessions, with per-file size limits and rolling per-source quotas enforced while the bytes stream in. All endpoints are versioned under /api/v0/."
    ),
    paths(
        handlers::upload::create_share,
        handlers::resumable::create_session,
        handlers::resumable::session_status,
        handlers::resumable::append_to_session,
        handlers::resumable::delete_session,
    ),
    components(schemas(
        models::ShareKind,
        models::ShareSummary,
        models::ShareCreatedResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "shares", description = "Single-shot share uploads"),
        (name = "uploads", description = "Resumable upload sessions")
    )
)]
struct ApiDoc;
