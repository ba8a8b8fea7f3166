//! Resumable upload session handlers.
//!
//! Offset-addressed protocol over four endpoints: POST creates a session,
//! HEAD reports the committed offset, PATCH appends at an exact offset, and
//! DELETE abandons the session. Bytes land in the session's partial file;
//! the share record and the permanent file only appear when the final byte
//! arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::StreamExt;
use sharebin_core::models::LimitEnvelope;
use sharebin_core::AppError;
use sharebin_ingest::{
    parse_upload_metadata, part_path, FinalizeRequest, FinalizedShare, IngestStream,
    ResumableSession, TransferMetadata,
};
use uuid::Uuid;

use crate::auth::resolve_identity;
use crate::constants::API_PREFIX;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

const UPLOAD_OFFSET: &str = "upload-offset";
const UPLOAD_LENGTH: &str = "upload-length";
const UPLOAD_DEFER_LENGTH: &str = "upload-defer-length";
const UPLOAD_METADATA: &str = "upload-metadata";
const SHARE_SLUG_HEADER: &str = "x-share-slug";
const SHARE_ID_HEADER: &str = "x-share-id";
const SHARE_EXPIRES_HEADER: &str = "x-share-expires";
const IS_BULK_HEADER: &str = "x-is-bulk";

/// Media type required on PATCH bodies.
const OFFSET_MEDIA_TYPE: &str = "application/offset+octet-stream";

/// Create a resumable upload session.
///
/// The caller declares the total size in `Upload-Length`, or defers it with
/// `Upload-Defer-Length: 1`. Metadata rides in `Upload-Metadata` as
/// comma-separated `key base64(value)` pairs and must include a filename.
/// Limits are resolved once here and enforced for the session's lifetime.
#[utoipa::path(
    post,
    path = "/api/v0/uploads",
    tag = "uploads",
    params(
        ("Upload-Length" = Option<u64>, Header, description = "Total upload size in bytes; mutually exclusive with Upload-Defer-Length"),
        ("Upload-Defer-Length" = Option<String>, Header, description = "Set to 1 when the total size is not yet known"),
        ("Upload-Metadata" = Option<String>, Header, description = "Comma-separated `key base64(value)` pairs; `filename` is required")
    ),
    responses(
        (status = 201, description = "Session created; its URL is in the Location header"),
        (status = 400, description = "Invalid metadata or length headers", body = ErrorResponse),
        (status = 413, description = "Declared length exceeds the per-file limit", body = ErrorResponse),
        (status = 429, description = "Rolling quota exhausted", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, headers),
    fields(session_id = tracing::field::Empty, operation = "create_session")
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let identity = resolve_identity(&headers, Some(&addr), &state.security);

    let fields = match header_str(&headers, UPLOAD_METADATA) {
        Some(raw) => parse_upload_metadata(raw)?,
        None => Default::default(),
    };
    let metadata = TransferMetadata::from_fields(&fields)?;
    metadata.validate_resumable(&identity, state.config.anon_expiry_max_days())?;

    let declared = parse_u64_header(&headers, UPLOAD_LENGTH)?;
    let defer_header = header_str(&headers, UPLOAD_DEFER_LENGTH).map(str::trim);
    if let Some(value) = defer_header {
        if value != "1" {
            return Err(AppError::Validation(
                "Upload-Defer-Length must be 1 when present".to_string(),
            )
            .into());
        }
    }
    match (declared, defer_header) {
        (Some(_), Some(_)) => {
            return Err(AppError::Validation(
                "Upload-Length and Upload-Defer-Length are mutually exclusive".to_string(),
            )
            .into())
        }
        (None, None) => {
            return Err(AppError::Validation(
                "Either Upload-Length or Upload-Defer-Length is required".to_string(),
            )
            .into())
        }
        _ => {}
    }

    let envelope = state.ingest.resolver.resolve(&identity).await?;
    // Refuse before creating anything when no byte could ever be accepted.
    if envelope.quota_exhausted() {
        return Err(AppError::QuotaExceeded {
            used: envelope.current_usage_bytes,
            quota: envelope.rolling_quota_bytes,
        }
        .into());
    }
    if let Some(declared) = declared {
        check_declared_length(declared, 0, &envelope)?;
    }

    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", tracing::field::display(session_id));

    // Materialize the empty partial now so the first PATCH can append to it.
    let stream = IngestStream::begin(&state.ingest.upload_root, session_id, envelope).await?;
    stream.detach().await?;

    let original_name = metadata.filename.clone().ok_or_else(|| {
        AppError::Internal("Resumable metadata lost its filename after validation".to_string())
    })?;
    let session = ResumableSession {
        id: session_id,
        declared_size: declared,
        observed_bytes: 0,
        envelope,
        metadata,
        original_name,
        created_at: Utc::now(),
    };
    state.ingest.sessions.put(session).await;
    state.ingest.identities.put(session_id, identity).await;

    tracing::info!(declared = ?declared, "Created resumable upload session");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::LOCATION,
        header_value(&format!("{}/uploads/{}", API_PREFIX, session_id))?,
    );
    response_headers.insert(
        HeaderName::from_static(UPLOAD_OFFSET),
        header_value("0")?,
    );
    Ok((StatusCode::CREATED, response_headers).into_response())
}

/// Report a session's committed offset.
#[utoipa::path(
    head,
    path = "/api/v0/uploads/{id}",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session id")),
    responses(
        (status = 200, description = "Offset in Upload-Offset; total size in Upload-Length once known"),
        (status = 404, description = "Session does not exist", body = ErrorResponse),
        (status = 409, description = "Session has a request in flight", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "session_status"))]
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpAppError> {
    let (observed, declared) = state.ingest.sessions.offset(id).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response_headers.insert(
        HeaderName::from_static(UPLOAD_OFFSET),
        header_value(&observed.to_string())?,
    );
    match declared {
        Some(declared) => {
            response_headers.insert(
                HeaderName::from_static(UPLOAD_LENGTH),
                header_value(&declared.to_string())?,
            );
        }
        None => {
            response_headers.insert(
                HeaderName::from_static(UPLOAD_DEFER_LENGTH),
                HeaderValue::from_static("1"),
            );
        }
    }
    Ok((StatusCode::OK, response_headers).into_response())
}

/// Append a chunk of bytes at the session's exact committed offset.
///
/// The final chunk flips the session into finalization: the partial becomes
/// a permanent file with a share record, and the response carries the share
/// coordinates in `X-Share-*` headers. A failed append either parks the
/// session again (recoverable: offset mismatch, interrupted body) or retires
/// it (terminal: limit trip, lost partial).
#[utoipa::path(
    patch,
    path = "/api/v0/uploads/{id}",
    tag = "uploads",
    params(
        ("id" = Uuid, Path, description = "Upload session id"),
        ("Upload-Offset" = u64, Header, description = "Offset this chunk starts at; must equal the committed offset"),
        ("Upload-Length" = Option<u64>, Header, description = "Declares the total size for a session created with Upload-Defer-Length")
    ),
    request_body(content = inline(String), content_type = "application/offset+octet-stream"),
    responses(
        (status = 204, description = "Chunk accepted; on completion the X-Share-* headers identify the share"),
        (status = 404, description = "Session does not exist", body = ErrorResponse),
        (status = 409, description = "Offset mismatch or concurrent append", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the per-file limit", body = ErrorResponse),
        (status = 415, description = "Body is not application/offset+octet-stream", body = ErrorResponse),
        (status = 429, description = "Rolling quota exhausted", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, headers, body),
    fields(session_id = %id, operation = "append_to_session")
)]
pub async fn append_to_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, HttpAppError> {
    require_offset_media_type(&headers)?;
    let provided_offset = parse_u64_header(&headers, UPLOAD_OFFSET)?
        .ok_or_else(|| AppError::Validation("Missing Upload-Offset header".to_string()))?;

    let mut session = state.ingest.sessions.take(id).await?;

    if provided_offset != session.observed_bytes {
        let expected = session.observed_bytes;
        state.ingest.sessions.put(session).await;
        return Err(AppError::OffsetMismatch {
            expected,
            provided: provided_offset,
        }
        .into());
    }

    // A deferred total size arrives on the first PATCH that knows it.
    if let Some(declared) = parse_u64_header(&headers, UPLOAD_LENGTH)? {
        match session.declared_size {
            Some(existing) if existing != declared => {
                state.ingest.sessions.put(session).await;
                return Err(AppError::Validation(
                    "Upload-Length cannot change once declared".to_string(),
                )
                .into());
            }
            Some(_) => {}
            None => {
                if let Err(e) = check_declared_length(declared, session.observed_bytes, &session.envelope)
                {
                    state.ingest.sessions.put(session).await;
                    return Err(e.into());
                }
                session.declared_size = Some(declared);
            }
        }
    }

    let mut stream = match IngestStream::resume(
        &state.ingest.upload_root,
        id,
        session.envelope,
        session.observed_bytes,
    )
    .await
    {
        Ok(stream) => stream,
        Err(e) => {
            // A missing or drifted partial can never complete.
            drop_session(&state, id).await;
            return Err(e.into());
        }
    };

    let mut data = body.into_data_stream();
    loop {
        let chunk = match data.next().await {
            None => break,
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                // Interrupted transfer: keep the partial, the client resumes
                // from the committed offset.
                let observed = match stream.detach().await {
                    Ok(observed) => observed,
                    Err(detach_err) => {
                        drop_session(&state, id).await;
                        return Err(detach_err.into());
                    }
                };
                session.observed_bytes = observed;
                state.ingest.sessions.put(session).await;
                return Err(
                    AppError::Validation(format!("Upload body interrupted: {}", e)).into(),
                );
            }
        };

        if let Some(declared) = session.declared_size {
            if stream.observed_bytes() + chunk.len() as u64 > declared {
                stream.abort().await;
                drop_session(&state, id).await;
                return Err(AppError::Validation(format!(
                    "Upload exceeds its declared length of {} bytes",
                    declared
                ))
                .into());
            }
        }

        if let Err(e) = stream.write_chunk(&chunk).await {
            // The engine already scrapped the partial.
            drop_session(&state, id).await;
            return Err(e.into());
        }
    }

    session.observed_bytes = stream.observed_bytes();

    if session.is_complete() {
        let finished = match stream.finish().await {
            Ok(finished) => finished,
            Err(e) => {
                drop_session(&state, id).await;
                return Err(e.into());
            }
        };

        // Identity captured at session creation; re-derive only if the vault
        // lost it (say, across a restart).
        let identity = match state.ingest.identities.take(id).await {
            Some(identity) => identity,
            None => resolve_identity(&headers, Some(&addr), &state.security),
        };

        let request = FinalizeRequest {
            temp_path: finished.temp_path,
            original_name: session.original_name.clone(),
            observed_bytes: finished.observed_bytes,
            mime_type: None,
            metadata: session.metadata.clone(),
            identity,
        };
        let finalized = match state.ingest.finalizer.finalize(request).await {
            Ok(finalized) => finalized,
            Err(e) => {
                state.ingest.sessions.retire(id).await;
                return Err(e.into());
            }
        };
        state.ingest.sessions.retire(id).await;

        tracing::info!(
            slug = %finalized.share.slug,
            observed_bytes = session.observed_bytes,
            "Resumable upload completed"
        );
        completion_response(session.observed_bytes, &finalized)
    } else {
        let observed = match stream.detach().await {
            Ok(observed) => observed,
            Err(e) => {
                drop_session(&state, id).await;
                return Err(e.into());
            }
        };
        session.observed_bytes = observed;
        state.ingest.sessions.put(session).await;

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            HeaderName::from_static(UPLOAD_OFFSET),
            header_value(&observed.to_string())?,
        );
        Ok((StatusCode::NO_CONTENT, response_headers).into_response())
    }
}

/// Abandon a session and delete its partial.
#[utoipa::path(
    delete,
    path = "/api/v0/uploads/{id}",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session id")),
    responses(
        (status = 204, description = "Session and partial deleted"),
        (status = 404, description = "Session does not exist", body = ErrorResponse),
        (status = 409, description = "Session has a request in flight", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "delete_session"))]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpAppError> {
    state.ingest.sessions.take(id).await?;

    let part = part_path(&state.ingest.upload_root, id);
    if let Err(e) = tokio::fs::remove_file(&part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %part.display(), "Failed to remove partial for deleted session");
        }
    }
    drop_session(&state, id).await;

    tracing::info!("Deleted upload session");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn drop_session(state: &AppState, id: Uuid) {
    state.ingest.sessions.retire(id).await;
    state.ingest.identities.take(id).await;
}

/// Reject a declared total that could never be accepted. Mirrors the
/// engine's mid-stream precedence: the quota error wins when the declaration
/// exceeds the remaining quota, the per-file error otherwise.
fn check_declared_length(
    declared: u64,
    observed: u64,
    envelope: &LimitEnvelope,
) -> Result<(), AppError> {
    if declared < observed {
        return Err(AppError::Validation(format!(
            "Upload-Length {} is less than the {} bytes already received",
            declared, observed
        )));
    }
    if declared > envelope.effective_max_bytes {
        if declared > envelope.remaining_quota_bytes {
            return Err(AppError::QuotaExceeded {
                used: envelope.current_usage_bytes,
                quota: envelope.rolling_quota_bytes,
            });
        }
        return Err(AppError::FileTooLarge {
            observed: declared,
            limit: envelope.per_file_max_bytes,
        });
    }
    Ok(())
}

fn require_offset_media_type(headers: &HeaderMap) -> Result<(), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let essence = content_type.split(';').next().map(str::trim);
    if essence == Some(OFFSET_MEDIA_TYPE) {
        return Ok(());
    }
    Err(AppError::UnsupportedMediaType(OFFSET_MEDIA_TYPE))
}

fn completion_response(
    offset: u64,
    finalized: &FinalizedShare,
) -> Result<Response, HttpAppError> {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        HeaderName::from_static(UPLOAD_OFFSET),
        header_value(&offset.to_string())?,
    );
    response_headers.insert(
        HeaderName::from_static(SHARE_SLUG_HEADER),
        header_value(&finalized.share.slug)?,
    );
    response_headers.insert(
        HeaderName::from_static(SHARE_ID_HEADER),
        header_value(&finalized.share.id.to_string())?,
    );
    if let Some(expires_at) = finalized.share.expires_at {
        response_headers.insert(
            HeaderName::from_static(SHARE_EXPIRES_HEADER),
            header_value(&expires_at.to_rfc3339())?,
        );
    }
    response_headers.insert(
        HeaderName::from_static(IS_BULK_HEADER),
        HeaderValue::from_static(if finalized.share.is_bulk { "true" } else { "false" }),
    );
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_u64_header(headers: &HeaderMap, name: &str) -> Result<Option<u64>, AppError> {
    match header_str(headers, name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| {
                AppError::Validation(format!(
                    "Header {} must be a non-negative integer",
                    name
                ))
            }),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(format!("Invalid response header value: {}", e)))
}
