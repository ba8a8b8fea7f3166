//! Streaming ingest engine.
//!
//! Multipart and resumable transfers share this single write path: bytes are
//! appended chunk by chunk to a `{sessionId}.part` file under the upload
//! temp directory, with the limit envelope enforced after every chunk. The
//! engine never buffers a whole file in memory, and a terminal failure never
//! leaves the partial behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sharebin_core::models::LimitEnvelope;
use sharebin_core::validation::validate_filename;
use sharebin_core::AppError;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::metadata::{MAX_METADATA_FIELDS, MAX_METADATA_VALUE_BYTES};

/// Subdirectory of the upload root holding in-flight `.part` files.
pub const TMP_DIR: &str = "tmp";

/// Partial-file path for a session.
pub fn part_path(upload_root: &Path, session_id: Uuid) -> PathBuf {
    upload_root
        .join(TMP_DIR)
        .join(format!("{}.part", session_id))
}

/// Create the upload root and its temp subdirectory.
pub async fn ensure_upload_dirs(upload_root: &Path) -> Result<(), AppError> {
    fs::create_dir_all(upload_root.join(TMP_DIR))
        .await
        .map_err(|e| {
            AppError::Internal(format!(
                "Failed to create upload directory {}: {}",
                upload_root.display(),
                e
            ))
        })
}

/// Remove a file, swallowing not-found and logging anything else.
pub(crate) async fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove file during cleanup");
        }
    }
}

/// File part accepted into the stream (multipart transfers).
#[derive(Debug, Clone)]
pub struct AcceptedFile {
    pub original_name: String,
    pub mime_type: Option<String>,
}

/// Everything the finalizer needs once a transfer's bytes are durable.
#[derive(Debug)]
pub struct FinishedTransfer {
    pub session_id: Uuid,
    pub temp_path: PathBuf,
    pub observed_bytes: u64,
    pub fields: HashMap<String, String>,
    pub file: Option<AcceptedFile>,
}

impl FinishedTransfer {
    /// Drop the temp file without finalizing, for callers that fail
    /// validation between the last byte and the finalizer.
    pub async fn discard(self) {
        remove_if_present(&self.temp_path).await;
    }
}

/// One in-flight transfer writing to a `.part` file.
///
/// `finish`, `detach`, and `abort` consume the stream, so a session's bytes
/// can only be settled once. A limit trip or a write failure scraps the
/// stream in place: the partial is deleted immediately and every later call
/// fails.
#[derive(Debug)]
pub struct IngestStream {
    session_id: Uuid,
    temp_path: PathBuf,
    file: File,
    observed: u64,
    envelope: LimitEnvelope,
    fields: HashMap<String, String>,
    accepted: Option<AcceptedFile>,
    scrapped: bool,
}

impl IngestStream {
    /// Open a fresh stream for a new session. Fails if a partial for this
    /// session already exists.
    pub async fn begin(
        upload_root: &Path,
        session_id: Uuid,
        envelope: LimitEnvelope,
    ) -> Result<Self, AppError> {
        let temp_path = part_path(upload_root, session_id);
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        tracing::debug!(session_id = %session_id, "opened ingest stream");
        Ok(Self {
            session_id,
            temp_path,
            file,
            observed: 0,
            envelope,
            fields: HashMap::new(),
            accepted: None,
            scrapped: false,
        })
    }

    /// Reopen a parked session's partial for appending.
    ///
    /// The partial on disk must be exactly as long as the session's recorded
    /// byte count; drift means the part was touched outside the engine. A
    /// missing partial reads as a missing session, since the session cannot
    /// ever complete without it.
    pub async fn resume(
        upload_root: &Path,
        session_id: Uuid,
        envelope: LimitEnvelope,
        observed_bytes: u64,
    ) -> Result<Self, AppError> {
        let temp_path = part_path(upload_root, session_id);
        let file = OpenOptions::new()
            .append(true)
            .open(&temp_path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AppError::SessionNotFound(session_id)
                } else {
                    AppError::Internal(format!(
                        "Failed to open temp file {}: {}",
                        temp_path.display(),
                        e
                    ))
                }
            })?;
        let on_disk = file
            .metadata()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to stat temp file: {}", e)))?
            .len();
        if on_disk != observed_bytes {
            return Err(AppError::Internal(format!(
                "Partial for session {} is {} bytes but the session recorded {}",
                session_id, on_disk, observed_bytes
            )));
        }
        Ok(Self {
            session_id,
            temp_path,
            file,
            observed: observed_bytes,
            envelope,
            fields: HashMap::new(),
            accepted: None,
            scrapped: false,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn observed_bytes(&self) -> u64 {
        self.observed
    }

    pub fn envelope(&self) -> &LimitEnvelope {
        &self.envelope
    }

    pub fn accepted_file(&self) -> Option<&AcceptedFile> {
        self.accepted.as_ref()
    }

    /// Buffer a non-file form field. Capped so field spam cannot grow
    /// memory.
    pub fn push_field(&mut self, name: &str, value: String) -> Result<(), AppError> {
        if self.fields.len() >= MAX_METADATA_FIELDS && !self.fields.contains_key(name) {
            return Err(AppError::Validation(format!(
                "Too many form fields (max {})",
                MAX_METADATA_FIELDS
            )));
        }
        if value.len() > MAX_METADATA_VALUE_BYTES {
            return Err(AppError::Validation(format!(
                "Form field '{}' exceeds {} bytes",
                name, MAX_METADATA_VALUE_BYTES
            )));
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Accept the file part. The filename is checked before any byte of the
    /// part is written; a second file part is rejected.
    pub fn accept_file(
        &mut self,
        original_name: &str,
        mime_type: Option<String>,
    ) -> Result<(), AppError> {
        if self.accepted.is_some() {
            return Err(AppError::Validation(
                "Exactly one file part is allowed".to_string(),
            ));
        }
        validate_filename(original_name)?;
        self.accepted = Some(AcceptedFile {
            original_name: original_name.to_string(),
            mime_type,
        });
        Ok(())
    }

    /// Append one chunk and enforce the limit envelope.
    ///
    /// Exceeding the effective ceiling is terminal: the partial is deleted
    /// before the error returns. The error is the quota error when the byte
    /// count also exceeds the remaining quota, the per-file error otherwise.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), AppError> {
        if self.scrapped {
            return Err(AppError::Internal(
                "Ingest stream already settled".to_string(),
            ));
        }
        if let Err(e) = self.file.write_all(chunk).await {
            self.scrap().await;
            return Err(AppError::Internal(format!(
                "Failed to write temp file: {}",
                e
            )));
        }
        self.observed = match self.observed.checked_add(chunk.len() as u64) {
            Some(total) => total,
            None => {
                self.scrap().await;
                return Err(AppError::Internal("Byte counter overflow".to_string()));
            }
        };
        if self.observed > self.envelope.effective_max_bytes {
            let err = self.limit_error();
            self.scrap().await;
            return Err(err);
        }
        Ok(())
    }

    /// Settle the stream: flush to disk and hand the partial over for
    /// finalizing.
    pub async fn finish(mut self) -> Result<FinishedTransfer, AppError> {
        if self.scrapped {
            return Err(AppError::Internal(
                "Ingest stream already settled".to_string(),
            ));
        }
        if let Err(e) = self.file.sync_all().await {
            self.scrap().await;
            return Err(AppError::Internal(format!(
                "Failed to sync temp file: {}",
                e
            )));
        }
        tracing::debug!(session_id = %self.session_id, bytes = self.observed, "ingest stream finished");
        Ok(FinishedTransfer {
            session_id: self.session_id,
            temp_path: self.temp_path,
            observed_bytes: self.observed,
            fields: self.fields,
            file: self.accepted,
        })
    }

    /// Park the stream, keeping the partial on disk for a later resume.
    /// Returns the byte count to record on the session.
    pub async fn detach(mut self) -> Result<u64, AppError> {
        if self.scrapped {
            return Err(AppError::Internal(
                "Ingest stream already settled".to_string(),
            ));
        }
        if let Err(e) = self.file.sync_all().await {
            self.scrap().await;
            return Err(AppError::Internal(format!(
                "Failed to sync temp file: {}",
                e
            )));
        }
        Ok(self.observed)
    }

    /// Destroy the stream and its partial.
    pub async fn abort(mut self) {
        if !self.scrapped {
            self.scrap().await;
        }
    }

    /// Which limit was actually exceeded: quota violations win because the
    /// quota is the scarcer resource.
    fn limit_error(&self) -> AppError {
        if self.observed > self.envelope.remaining_quota_bytes {
            AppError::QuotaExceeded {
                used: self.envelope.current_usage_bytes,
                quota: self.envelope.rolling_quota_bytes,
            }
        } else {
            AppError::FileTooLarge {
                observed: self.observed,
                limit: self.envelope.per_file_max_bytes,
            }
        }
    }

    async fn scrap(&mut self) {
        self.scrapped = true;
        let _ = self.file.shutdown().await;
        remove_if_present(&self.temp_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharebin_core::models::LimitTier;

    fn envelope(max_file: u64, quota: u64, usage: u64) -> LimitEnvelope {
        LimitEnvelope::from_tier(
            LimitTier {
                max_file_bytes: max_file,
                quota_bytes: quota,
            },
            usage,
        )
    }

    async fn root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        ensure_upload_dirs(dir.path()).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn writes_chunks_and_finishes() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let mut stream = IngestStream::begin(dir.path(), id, envelope(100, 1000, 0))
            .await
            .unwrap();

        stream.write_chunk(b"hello ").await.unwrap();
        stream.write_chunk(b"world").await.unwrap();
        assert_eq!(stream.observed_bytes(), 11);

        let finished = stream.finish().await.unwrap();
        assert_eq!(finished.observed_bytes, 11);
        assert_eq!(std::fs::read(&finished.temp_path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_and_partial_deleted() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let mut stream = IngestStream::begin(dir.path(), id, envelope(10, 1000, 0))
            .await
            .unwrap();

        stream.write_chunk(&[0u8; 8]).await.unwrap();
        let err = stream.write_chunk(&[0u8; 8]).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::FileTooLarge {
                observed: 16,
                limit: 10
            }
        ));
        assert!(!part_path(dir.path(), id).exists());

        // The stream is terminal after a limit trip.
        assert!(stream.write_chunk(b"x").await.is_err());
    }

    #[tokio::test]
    async fn quota_violation_takes_precedence_over_file_size() {
        let dir = root().await;
        let id = Uuid::new_v4();
        // 5 bytes of quota left, so the effective ceiling is the quota
        // remainder rather than the per-file limit.
        let mut stream = IngestStream::begin(dir.path(), id, envelope(50, 100, 95))
            .await
            .unwrap();

        let err = stream.write_chunk(&[0u8; 6]).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::QuotaExceeded {
                used: 95,
                quota: 100
            }
        ));
        assert!(!part_path(dir.path(), id).exists());
    }

    #[tokio::test]
    async fn detach_and_resume_appends() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let env = envelope(100, 1000, 0);

        let mut stream = IngestStream::begin(dir.path(), id, env).await.unwrap();
        stream.write_chunk(b"abcd").await.unwrap();
        let parked = stream.detach().await.unwrap();
        assert_eq!(parked, 4);
        assert!(part_path(dir.path(), id).exists());

        let mut stream = IngestStream::resume(dir.path(), id, env, parked).await.unwrap();
        stream.write_chunk(b"efg").await.unwrap();
        let finished = stream.finish().await.unwrap();
        assert_eq!(finished.observed_bytes, 7);
        assert_eq!(std::fs::read(&finished.temp_path).unwrap(), b"abcdefg");
    }

    #[tokio::test]
    async fn resume_rejects_length_drift() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let env = envelope(100, 1000, 0);

        let mut stream = IngestStream::begin(dir.path(), id, env).await.unwrap();
        stream.write_chunk(b"abcd").await.unwrap();
        stream.detach().await.unwrap();

        assert!(IngestStream::resume(dir.path(), id, env, 3).await.is_err());
    }

    #[tokio::test]
    async fn resume_of_missing_partial_is_session_not_found() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let err = IngestStream::resume(dir.path(), id, envelope(100, 1000, 0), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(found) if found == id));
    }

    #[tokio::test]
    async fn abort_removes_partial() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let mut stream = IngestStream::begin(dir.path(), id, envelope(100, 1000, 0))
            .await
            .unwrap();
        stream.write_chunk(b"abcd").await.unwrap();
        stream.abort().await;
        assert!(!part_path(dir.path(), id).exists());
    }

    #[tokio::test]
    async fn rejects_second_file_part_and_bad_filenames() {
        let dir = root().await;
        let mut stream = IngestStream::begin(dir.path(), Uuid::new_v4(), envelope(100, 1000, 0))
            .await
            .unwrap();

        assert!(stream.accept_file("../evil.sh", None).is_err());
        stream.accept_file("report.pdf", None).unwrap();
        assert!(stream.accept_file("second.pdf", None).is_err());
        stream.abort().await;
    }

    #[tokio::test]
    async fn caps_metadata_fields() {
        let dir = root().await;
        let mut stream = IngestStream::begin(dir.path(), Uuid::new_v4(), envelope(100, 1000, 0))
            .await
            .unwrap();

        let oversized = "x".repeat(MAX_METADATA_VALUE_BYTES + 1);
        assert!(stream.push_field("slug", oversized).is_err());

        for i in 0..MAX_METADATA_FIELDS {
            stream.push_field(&format!("f{}", i), "v".to_string()).unwrap();
        }
        assert!(stream.push_field("one-too-many", "v".to_string()).is_err());
        // Overwriting an existing key is still allowed at the cap.
        assert!(stream.push_field("f0", "v2".to_string()).is_ok());
        stream.abort().await;
    }

    #[tokio::test]
    async fn begin_refuses_existing_partial() {
        let dir = root().await;
        let id = Uuid::new_v4();
        let _stream = IngestStream::begin(dir.path(), id, envelope(100, 1000, 0))
            .await
            .unwrap();
        assert!(IngestStream::begin(dir.path(), id, envelope(100, 1000, 0))
            .await
            .is_err());
    }
}
