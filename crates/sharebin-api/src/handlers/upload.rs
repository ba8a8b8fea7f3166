//! Single-shot multipart upload handler.
//!
//! Streams the file part straight into a temp file while enforcing the
//! caller's limit envelope on every chunk, then hands the finished transfer
//! to the finalizer. At no point is the whole file held in memory.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sharebin_core::models::{
    IdentityContext, LimitEnvelope, ShareCreatedResponse, ShareSummary,
};
use sharebin_core::AppError;
use sharebin_ingest::{
    FinalizeRequest, FinishedTransfer, IngestStream, TransferMetadata,
};
use uuid::Uuid;

use crate::auth::resolve_identity;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Multipart part name that carries the file bytes. Every other part is
/// treated as a metadata field.
const FILE_FIELD: &str = "file";

/// Upload a file as a new share in a single request.
///
/// The request must contain exactly one `file` part. Metadata fields may
/// arrive before or after it; they are validated once the body has been
/// read, because enforcing limits mid-stream must not wait for trailing
/// fields.
#[utoipa::path(
    post,
    path = "/api/v0/shares",
    tag = "shares",
    request_body(
        content = inline(String),
        content_type = "multipart/form-data",
        description = "One `file` part plus metadata fields: `type` (required, FILE), `slug`, `password`, `expiresAt`, and the bulk fields `isBulk`, `bulkShareId`, `fileIndex`, `totalFiles`, `relativePath`"
    ),
    responses(
        (status = 201, description = "Share created", body = ShareCreatedResponse),
        (status = 400, description = "Invalid metadata or malformed body", body = ErrorResponse),
        (status = 409, description = "Requested slug already taken", body = ErrorResponse),
        (status = 413, description = "File exceeds the per-file limit", body = ErrorResponse),
        (status = 429, description = "Rolling quota exhausted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, headers, multipart),
    fields(
        source_address = tracing::field::Empty,
        observed_bytes = tracing::field::Empty,
        operation = "create_share"
    )
)]
pub async fn create_share(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, HttpAppError> {
    let identity = resolve_identity(&headers, Some(&addr), &state.security);
    tracing::Span::current().record("source_address", identity.source_address.as_str());

    let envelope = state.ingest.resolver.resolve(&identity).await?;
    // An exhausted quota refuses the transfer before any byte is read.
    if envelope.quota_exhausted() {
        return Err(AppError::QuotaExceeded {
            used: envelope.current_usage_bytes,
            quota: envelope.rolling_quota_bytes,
        }
        .into());
    }

    let finished = read_multipart(&state.ingest.upload_root, envelope, multipart).await?;
    tracing::Span::current().record("observed_bytes", finished.observed_bytes);

    let metadata =
        match validate_finished(&finished, &identity, state.config.anon_expiry_max_days()) {
            Ok(metadata) => metadata,
            Err(e) => {
                finished.discard().await;
                return Err(e.into());
            }
        };

    let FinishedTransfer {
        temp_path,
        observed_bytes,
        file,
        ..
    } = finished;
    let file = file
        .ok_or_else(|| AppError::Internal("Accepted transfer lost its file part".to_string()))?;

    let finalized = state
        .ingest
        .finalizer
        .finalize(FinalizeRequest {
            temp_path,
            original_name: file.original_name,
            observed_bytes,
            mime_type: file.mime_type,
            metadata,
            identity,
        })
        .await?;

    let summary = ShareSummary {
        slug: finalized.share.slug.clone(),
        kind: finalized.share.kind,
        filename: finalized.original_name.clone(),
        expires_at: finalized.share.expires_at,
        has_password: finalized.share.has_password(),
    };

    Ok((StatusCode::CREATED, Json(ShareCreatedResponse { share: summary })).into_response())
}

/// Check the finished transfer has everything the finalizer needs. The
/// caller discards the temp file when this fails.
fn validate_finished(
    finished: &FinishedTransfer,
    identity: &IdentityContext,
    anon_expiry_max_days: i64,
) -> Result<TransferMetadata, AppError> {
    if finished.file.is_none() {
        return Err(AppError::Validation(
            "Missing required file part 'file'".to_string(),
        ));
    }
    let metadata = TransferMetadata::from_fields(&finished.fields)?;
    metadata.validate_multipart(identity, anon_expiry_max_days)?;
    Ok(metadata)
}

/// Drive the multipart body through an ingest stream.
///
/// A limit trip or write failure inside `write_chunk` has already deleted
/// the partial; every other failure aborts the stream here so no partial is
/// ever left behind.
async fn read_multipart(
    upload_root: &Path,
    envelope: LimitEnvelope,
    mut multipart: Multipart,
) -> Result<FinishedTransfer, AppError> {
    let mut stream = IngestStream::begin(upload_root, Uuid::new_v4(), envelope).await?;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                stream.abort().await;
                return Err(AppError::Validation(format!(
                    "Malformed multipart body: {}",
                    e
                )));
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            stream.abort().await;
            return Err(AppError::Validation(
                "Multipart part is missing a name".to_string(),
            ));
        };

        if name == FILE_FIELD {
            let Some(original_name) = field.file_name().map(str::to_string) else {
                stream.abort().await;
                return Err(AppError::Validation(
                    "File part is missing a filename".to_string(),
                ));
            };
            let mime_type = field.content_type().map(str::to_string);
            if let Err(e) = stream.accept_file(&original_name, mime_type) {
                stream.abort().await;
                return Err(e);
            }

            loop {
                match field.chunk().await {
                    Ok(Some(chunk)) => stream.write_chunk(&chunk).await?,
                    Ok(None) => break,
                    Err(e) => {
                        stream.abort().await;
                        return Err(AppError::Validation(format!(
                            "Failed to read file part: {}",
                            e
                        )));
                    }
                }
            }
        } else {
            let value = match field.text().await {
                Ok(value) => value,
                Err(e) => {
                    stream.abort().await;
                    return Err(AppError::Validation(format!(
                        "Failed to read field '{}': {}",
                        name, e
                    )));
                }
            };
            if let Err(e) = stream.push_field(&name, value) {
                stream.abort().await;
                return Err(e);
            }
        }
    }

    stream.finish().await
}
