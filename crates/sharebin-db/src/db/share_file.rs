use sharebin_core::models::{NewShareFile, ShareFile};
use sharebin_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use super::{pg_error_code, FOREIGN_KEY_VIOLATION, UNIQUE_VIOLATION};

/// Repository for files attached to bulk shares
#[derive(Clone)]
pub struct ShareFileRepository {
    pool: PgPool,
}

impl ShareFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach a file to a bulk share. A foreign-key violation means the
    /// parent vanished between the caller's existence check and this insert;
    /// it surfaces as `BulkParentMissing` so the caller can clean up the
    /// just-placed file.
    pub async fn insert(&self, new_file: NewShareFile) -> Result<ShareFile, AppError> {
        let result = sqlx::query_as::<_, ShareFile>(
            r#"
            INSERT INTO share_files (share_id, file_name, original_name, relative_path, size_bytes, mime_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, share_id, file_name, original_name, relative_path, size_bytes, mime_type, created_at
            "#,
        )
        .bind(new_file.share_id)
        .bind(&new_file.file_name)
        .bind(&new_file.original_name)
        .bind(&new_file.relative_path)
        .bind(new_file.size_bytes)
        .bind(&new_file.mime_type)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(file) => Ok(file),
            Err(err) => match pg_error_code(&err).as_deref() {
                Some(FOREIGN_KEY_VIOLATION) => {
                    tracing::warn!(
                        share_id = %new_file.share_id,
                        "bulk parent vanished between check and insert"
                    );
                    Err(AppError::BulkParentMissing(new_file.share_id))
                }
                Some(UNIQUE_VIOLATION) => Err(AppError::Validation(format!(
                    "File '{}' already exists in this bulk share",
                    new_file.file_name
                ))),
                _ => Err(err.into()),
            },
        }
    }

    pub async fn list_by_share(&self, share_id: Uuid) -> Result<Vec<ShareFile>, AppError> {
        let files = sqlx::query_as::<_, ShareFile>(
            r#"
            SELECT id, share_id, file_name, original_name, relative_path, size_bytes, mime_type, created_at
            FROM share_files
            WHERE share_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(share_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    /// Sum of recorded sizes of a share's files. Bulk quota accounting uses
    /// this instead of statting every file on disk.
    pub async fn sum_sizes(&self, share_id: Uuid) -> Result<u64, AppError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM share_files WHERE share_id = $1",
        )
        .bind(share_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.max(0) as u64)
    }
}
