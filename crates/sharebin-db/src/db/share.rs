use sharebin_core::models::{NewShare, Share};
use sharebin_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use super::{pg_constraint, pg_error_code, UNIQUE_VIOLATION};

const SHARE_COLUMNS: &str = "id, slug, kind, file_name, owner_id, source_address, \
     secret_hash, expires_at, is_bulk, created_at";

/// Repository for share records
#[derive(Clone)]
pub struct ShareRepository {
    pool: PgPool,
}

impl ShareRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a share. Unique violations are mapped onto domain errors: a
    /// slug collision becomes `SlugTaken`, an id collision (explicit bulk
    /// share id replay) becomes `ShareExists`.
    pub async fn create(&self, new_share: NewShare) -> Result<Share, AppError> {
        let id = new_share.id.unwrap_or_else(Uuid::new_v4);

        // Dynamic SQLx queries avoid requiring DATABASE_URL/sqlx prepare at
        // build time.
        let result = sqlx::query_as::<_, Share>(&format!(
            r#"
            INSERT INTO shares (id, slug, kind, owner_id, source_address, secret_hash, expires_at, is_bulk)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SHARE_COLUMNS
        ))
        .bind(id)
        .bind(&new_share.slug)
        .bind(new_share.kind.as_str())
        .bind(new_share.owner_id)
        .bind(&new_share.source_address)
        .bind(&new_share.secret_hash)
        .bind(new_share.expires_at)
        .bind(new_share.is_bulk)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(share) => Ok(share),
            Err(err) if pg_error_code(&err).as_deref() == Some(UNIQUE_VIOLATION) => {
                match pg_constraint(&err).as_deref() {
                    Some("shares_pkey") => Err(AppError::ShareExists(id)),
                    _ => Err(AppError::SlugTaken(new_share.slug)),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Share>, AppError> {
        let share = sqlx::query_as::<_, Share>(&format!(
            "SELECT {} FROM shares WHERE id = $1",
            SHARE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(share)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Share>, AppError> {
        let share = sqlx::query_as::<_, Share>(&format!(
            "SELECT {} FROM shares WHERE slug = $1",
            SHARE_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(share)
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shares WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    /// Record the landed file of a single-file share.
    pub async fn set_file_name(&self, share_id: Uuid, file_name: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE shares SET file_name = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(share_id)
        .bind(file_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!(
                "share {} vanished before its file reference was recorded",
                share_id
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM shares WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All FILE-kind shares attributed to a source address, for quota
    /// accounting.
    pub async fn list_file_shares_by_source(
        &self,
        source_address: &str,
    ) -> Result<Vec<Share>, AppError> {
        let shares = sqlx::query_as::<_, Share>(&format!(
            "SELECT {} FROM shares WHERE source_address = $1 AND kind = 'FILE'",
            SHARE_COLUMNS
        ))
        .bind(source_address)
        .fetch_all(&self.pool)
        .await?;

        Ok(shares)
    }
}
