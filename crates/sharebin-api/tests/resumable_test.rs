//! Resumable upload protocol integration tests.
//!
//! Run with: `cargo test -p sharebin-api --test resumable_test`
//! Backed by the in-memory store; no external services required.

mod helpers;

use axum::http::Method;
use axum_test::TestResponse;
use bytes::Bytes;
use helpers::{
    api_path, auth_token, setup_test_app, setup_test_app_with_tiers, share_form, upload_metadata,
    TestApp,
};
use sharebin_core::models::LimitTier;
use sharebin_core::ShareStore;
use uuid::Uuid;

const OFFSET_MEDIA_TYPE: &str = "application/offset+octet-stream";

fn session_id_from(response: &TestResponse) -> Uuid {
    let location = response.header("location");
    let id = location.to_str().unwrap().rsplit('/').next().unwrap();
    Uuid::parse_str(id).expect("Location does not end in a session id")
}

async fn create_session(app: &TestApp, length: u64) -> Uuid {
    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", length.to_string())
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "report.pdf")]),
        )
        .await;
    assert_eq!(response.status_code(), 201);
    session_id_from(&response)
}

async fn append(app: &TestApp, id: Uuid, offset: u64, body: &[u8]) -> TestResponse {
    app.client()
        .patch(&api_path(&format!("/uploads/{}", id)))
        .add_header("Content-Type", OFFSET_MEDIA_TYPE)
        .add_header("Upload-Offset", offset.to_string())
        .bytes(Bytes::from(body.to_vec()))
        .await
}

async fn status_of(app: &TestApp, id: Uuid) -> TestResponse {
    app.client()
        .method(Method::HEAD, &api_path(&format!("/uploads/{}", id)))
        .await
}

#[tokio::test]
async fn test_create_session_materializes_empty_partial() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "11")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "report.pdf")]),
        )
        .await;
    assert_eq!(response.status_code(), 201);
    assert_eq!(response.header("upload-offset"), "0");

    let location = response.header("location");
    assert!(location
        .to_str()
        .unwrap()
        .starts_with(&api_path("/uploads/")));

    let id = session_id_from(&response);
    assert_eq!(app.partial_files(), vec![format!("{}.part", id)]);
    assert!(app.permanent_files().is_empty());
}

#[tokio::test]
async fn test_create_session_requires_filename_metadata() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "11")
        .await;
    assert_eq!(response.status_code(), 400);
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_create_session_requires_exactly_one_length_header() {
    let app = setup_test_app().await;
    let metadata = upload_metadata(&[("filename", "report.pdf")]);

    // Both at once.
    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "11")
        .add_header("Upload-Defer-Length", "1")
        .add_header("Upload-Metadata", metadata.clone())
        .await;
    assert_eq!(response.status_code(), 400);

    // Neither.
    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Metadata", metadata)
        .await;
    assert_eq!(response.status_code(), 400);
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_oversized_declaration_rejected_up_front() {
    let app = setup_test_app_with_tiers(
        LimitTier {
            max_file_bytes: 1024,
            quota_bytes: 10 * 1024,
        },
        LimitTier {
            max_file_bytes: 1024 * 1024,
            quota_bytes: 4 * 1024 * 1024,
        },
    )
    .await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "2048")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "big.bin")]),
        )
        .await;
    assert_eq!(response.status_code(), 413);

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "FILE_TOO_LARGE");
    // No session, no partial.
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_declaration_beyond_quota_is_refused_as_quota() {
    let app = setup_test_app_with_tiers(
        LimitTier {
            max_file_bytes: 4096,
            quota_bytes: 1024,
        },
        LimitTier {
            max_file_bytes: 1024 * 1024,
            quota_bytes: 4 * 1024 * 1024,
        },
    )
    .await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "2048")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "big.bin")]),
        )
        .await;
    assert_eq!(response.status_code(), 429);

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_deferred_length_quota_trips_mid_stream() {
    let app = setup_test_app_with_tiers(
        LimitTier {
            max_file_bytes: 4096,
            quota_bytes: 1024,
        },
        LimitTier {
            max_file_bytes: 1024 * 1024,
            quota_bytes: 4 * 1024 * 1024,
        },
    )
    .await;

    // No declared length, so nothing is rejected up front.
    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Defer-Length", "1")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "big.bin")]),
        )
        .await;
    assert_eq!(response.status_code(), 201);
    let id = session_id_from(&response);

    let response = append(&app, id, 0, &vec![0u8; 2048]).await;
    assert_eq!(response.status_code(), 429);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "QUOTA_EXCEEDED");

    // A quota trip is terminal: session gone, partial scrapped.
    let response = status_of(&app, id).await;
    assert_eq!(response.status_code(), 404);
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_chunked_upload_completes_share() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;

    let response = append(&app, id, 0, b"hello ").await;
    assert_eq!(response.status_code(), 204);
    assert_eq!(response.header("upload-offset"), "6");
    // Not complete yet, so no share coordinates.
    assert!(response.maybe_header("x-share-slug").is_none());

    let response = append(&app, id, 6, b"world").await;
    assert_eq!(response.status_code(), 204);
    assert_eq!(response.header("upload-offset"), "11");
    assert_eq!(response.header("x-is-bulk"), "false");
    // Anonymous shares always carry an expiry.
    assert!(response.maybe_header("x-share-expires").is_some());

    let slug = response.header("x-share-slug");
    let slug = slug.to_str().unwrap();
    assert_eq!(slug.len(), 8);
    let share_id = response.header("x-share-id");
    let share_id = Uuid::parse_str(share_id.to_str().unwrap()).unwrap();

    let stored = app
        .store
        .find_share_by_id(share_id)
        .await
        .unwrap()
        .expect("share row missing");
    assert_eq!(stored.slug, slug);
    let file_name = stored.file_name.expect("file reference missing");
    assert!(file_name.ends_with("_report.pdf"));
    assert_eq!(
        std::fs::read(app.upload_root.join(&file_name)).unwrap(),
        b"hello world"
    );

    // The session is gone and the partial with it.
    assert!(app.partial_files().is_empty());
    assert_eq!(status_of(&app, id).await.status_code(), 404);
}

#[tokio::test]
async fn test_status_reports_committed_offset() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;
    append(&app, id, 0, b"hello ").await;

    let response = status_of(&app, id).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("cache-control"), "no-store");
    assert_eq!(response.header("upload-offset"), "6");
    assert_eq!(response.header("upload-length"), "11");
    assert!(response.maybe_header("upload-defer-length").is_none());
}

#[tokio::test]
async fn test_deferred_length_session_completes_once_declared() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Defer-Length", "1")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "report.pdf")]),
        )
        .await;
    assert_eq!(response.status_code(), 201);
    let id = session_id_from(&response);

    let response = status_of(&app, id).await;
    assert_eq!(response.header("upload-defer-length"), "1");
    assert!(response.maybe_header("upload-length").is_none());

    let response = append(&app, id, 0, b"hello ").await;
    assert_eq!(response.status_code(), 204);

    // The total arrives on the final chunk.
    let response = app
        .client()
        .patch(&api_path(&format!("/uploads/{}", id)))
        .add_header("Content-Type", OFFSET_MEDIA_TYPE)
        .add_header("Upload-Offset", "6")
        .add_header("Upload-Length", "11")
        .bytes(Bytes::from_static(b"world"))
        .await;
    assert_eq!(response.status_code(), 204);
    assert!(response.maybe_header("x-share-slug").is_some());
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_offset_mismatch_conflicts_and_preserves_session() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;

    let response = append(&app, id, 5, b"hello").await;
    assert_eq!(response.status_code(), 409);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "OFFSET_MISMATCH");
    assert_eq!(body["recoverable"], true);

    // The session survived untouched.
    let response = status_of(&app, id).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("upload-offset"), "0");

    let response = append(&app, id, 0, b"hello world").await;
    assert_eq!(response.status_code(), 204);
    assert!(response.maybe_header("x-share-slug").is_some());
}

#[tokio::test]
async fn test_append_requires_offset_media_type() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;

    let response = app
        .client()
        .patch(&api_path(&format!("/uploads/{}", id)))
        .add_header("Content-Type", "text/plain")
        .add_header("Upload-Offset", "0")
        .bytes(Bytes::from_static(b"hello"))
        .await;
    assert_eq!(response.status_code(), 415);

    let response = status_of(&app, id).await;
    assert_eq!(response.header("upload-offset"), "0");
}

#[tokio::test]
async fn test_append_requires_offset_header() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;

    let response = app
        .client()
        .patch(&api_path(&format!("/uploads/{}", id)))
        .add_header("Content-Type", OFFSET_MEDIA_TYPE)
        .bytes(Bytes::from_static(b"hello"))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = setup_test_app().await;
    let id = Uuid::new_v4();

    assert_eq!(status_of(&app, id).await.status_code(), 404);
    assert_eq!(append(&app, id, 0, b"hello").await.status_code(), 404);
    assert_eq!(
        app.client()
            .delete(&api_path(&format!("/uploads/{}", id)))
            .await
            .status_code(),
        404
    );
}

#[tokio::test]
async fn test_body_beyond_declared_length_retires_session() {
    let app = setup_test_app().await;
    let id = create_session(&app, 4).await;

    let response = append(&app, id, 0, b"too long").await;
    assert_eq!(response.status_code(), 400);

    // Terminal: the session and its partial are gone.
    assert_eq!(status_of(&app, id).await.status_code(), 404);
    assert!(app.partial_files().is_empty());
}

#[tokio::test]
async fn test_declared_length_cannot_change() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;

    let response = app
        .client()
        .patch(&api_path(&format!("/uploads/{}", id)))
        .add_header("Content-Type", OFFSET_MEDIA_TYPE)
        .add_header("Upload-Offset", "0")
        .add_header("Upload-Length", "12")
        .bytes(Bytes::from_static(b"xx"))
        .await;
    assert_eq!(response.status_code(), 400);

    // Recoverable: nothing was written, the session is still parked.
    let response = status_of(&app, id).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("upload-offset"), "0");
}

#[tokio::test]
async fn test_delete_session_removes_partial() {
    let app = setup_test_app().await;
    let id = create_session(&app, 11).await;
    append(&app, id, 0, b"hello ").await;
    assert_eq!(app.partial_files().len(), 1);

    let response = app
        .client()
        .delete(&api_path(&format!("/uploads/{}", id)))
        .await;
    assert_eq!(response.status_code(), 204);

    assert!(app.partial_files().is_empty());
    assert_eq!(status_of(&app, id).await.status_code(), 404);
}

#[tokio::test]
async fn test_completed_session_cannot_be_appended() {
    let app = setup_test_app().await;
    let id = create_session(&app, 5).await;

    let response = append(&app, id, 0, b"hello").await;
    assert_eq!(response.status_code(), 204);
    assert!(response.maybe_header("x-share-slug").is_some());

    assert_eq!(append(&app, id, 5, b"more").await.status_code(), 404);
}

#[tokio::test]
async fn test_identity_is_captured_at_creation() {
    let app = setup_test_app().await;
    let user_id = Uuid::new_v4();

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "4")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "report.pdf")]),
        )
        .add_header("Authorization", format!("Bearer {}", auth_token(user_id)))
        .await;
    assert_eq!(response.status_code(), 201);
    let id = session_id_from(&response);

    // The completing request carries no credentials; the session remembers.
    let response = append(&app, id, 0, b"data").await;
    assert_eq!(response.status_code(), 204);
    // Authenticated shares only expire when asked to.
    assert!(response.maybe_header("x-share-expires").is_none());

    let share_id = response.header("x-share-id");
    let share_id = Uuid::parse_str(share_id.to_str().unwrap()).unwrap();
    let stored = app.store.find_share_by_id(share_id).await.unwrap().unwrap();
    assert_eq!(stored.owner_id, Some(user_id));
}

#[tokio::test]
async fn test_resumable_bulk_member_completes() {
    let app = setup_test_app().await;
    let bulk_id = Uuid::new_v4();

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Upload-Length", "5")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[
                ("filename", "readme.md"),
                ("isBulk", "true"),
                ("bulkShareId", &bulk_id.to_string()),
                ("fileIndex", "0"),
                ("totalFiles", "1"),
                ("relativePath", "docs/readme.md"),
            ]),
        )
        .await;
    assert_eq!(response.status_code(), 201);
    let id = session_id_from(&response);

    let response = append(&app, id, 0, b"notes").await;
    assert_eq!(response.status_code(), 204);
    assert_eq!(response.header("x-is-bulk"), "true");
    let share_id = response.header("x-share-id");
    assert_eq!(share_id.to_str().unwrap(), bulk_id.to_string());

    let files = app.store.list_share_files(bulk_id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "docs/readme.md");
    assert!(app.upload_root.join(&files[0].file_name).exists());
}

#[tokio::test]
async fn test_exhausted_quota_refuses_new_sessions() {
    let app = setup_test_app_with_tiers(
        LimitTier {
            max_file_bytes: 1024,
            quota_bytes: 1024,
        },
        LimitTier {
            max_file_bytes: 1024 * 1024,
            quota_bytes: 4 * 1024 * 1024,
        },
    )
    .await;
    let source = "198.51.100.7";

    // Fill the source's quota with a single-shot upload.
    let response = app
        .client()
        .post(&api_path("/shares"))
        .add_header("X-Forwarded-For", source)
        .multipart(share_form("fill.bin", &vec![0u8; 1024]))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("X-Forwarded-For", source)
        .add_header("Upload-Length", "1")
        .add_header(
            "Upload-Metadata",
            upload_metadata(&[("filename", "more.bin")]),
        )
        .await;
    assert_eq!(response.status_code(), 429);

    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
}
