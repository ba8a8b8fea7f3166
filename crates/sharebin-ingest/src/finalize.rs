//! Upload finalizer.
//!
//! Once a transfer's bytes are durable in a temp file, finalizing turns
//! them into a share: slug allocation, secret hashing, expiry resolution,
//! the record write, and the temp-to-permanent rename, with compensating
//! cleanup on every failure path. No path out of here leaves a file on disk
//! that no row references.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sharebin_core::models::{IdentityContext, NewShare, Share, ShareKind};
use sharebin_core::validation::{resolve_expiry, sanitize_filename, validate_secret, validate_slug};
use sharebin_core::{AppError, ShareStore};
use tokio::fs;
use uuid::Uuid;

use crate::bulk::BulkCoordinator;
use crate::metadata::TransferMetadata;
use crate::stream::remove_if_present;

const GENERATED_SLUG_LENGTH: usize = 8;
const MAX_SLUG_ATTEMPTS: u32 = 24;
/// bcrypt cost factor for share secrets.
const SECRET_HASH_COST: u32 = 12;

/// Input for finalizing one fully-written transfer.
#[derive(Debug)]
pub struct FinalizeRequest {
    pub temp_path: PathBuf,
    pub original_name: String,
    pub observed_bytes: u64,
    pub mime_type: Option<String>,
    pub metadata: TransferMetadata,
    pub identity: IdentityContext,
}

/// A finalized share, plus the names the caller needs for its response.
#[derive(Debug, Clone)]
pub struct FinalizedShare {
    pub share: Share,
    /// Permanent on-disk name, relative to the upload root.
    pub file_name: String,
    /// Name the uploader supplied.
    pub original_name: String,
}

#[derive(Clone)]
pub struct UploadFinalizer {
    store: Arc<dyn ShareStore>,
    upload_root: PathBuf,
    anon_expiry_max_days: i64,
    bulk: BulkCoordinator,
}

impl UploadFinalizer {
    pub fn new(
        store: Arc<dyn ShareStore>,
        upload_root: impl Into<PathBuf>,
        anon_expiry_max_days: i64,
    ) -> Self {
        let upload_root = upload_root.into();
        let bulk = BulkCoordinator::new(store.clone(), upload_root.clone());
        Self {
            store,
            upload_root,
            anon_expiry_max_days,
            bulk,
        }
    }

    /// Finalize a transfer whose bytes already sit in `temp_path`.
    ///
    /// Failing before the rename removes the temp file; failing after it
    /// removes the permanent file instead. An already-created share record
    /// is never rolled back here, only files are.
    pub async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizedShare, AppError> {
        let temp_path = request.temp_path.clone();
        match self.run(request).await {
            Ok(finalized) => Ok(finalized),
            Err(err) => {
                remove_if_present(&temp_path).await;
                Err(err)
            }
        }
    }

    async fn run(&self, request: FinalizeRequest) -> Result<FinalizedShare, AppError> {
        let FinalizeRequest {
            temp_path,
            original_name,
            observed_bytes,
            mime_type,
            metadata,
            identity,
        } = request;

        let secret_hash = match metadata.password.as_deref() {
            Some(secret) => Some(hash_secret(secret)?),
            None => None,
        };
        let expires_at = resolve_expiry(
            metadata.expires_at,
            identity.is_authenticated,
            self.anon_expiry_max_days,
        );

        match metadata.bulk {
            None => {
                let slug = self.resolve_slug(metadata.slug.as_deref()).await?;
                self.finalize_single(temp_path, original_name, slug, secret_hash, expires_at, identity)
                    .await
            }
            Some(position) => {
                // Only the first file creates the parent share, so only it
                // needs a slug.
                let slug = if position.is_first() {
                    Some(self.resolve_slug(metadata.slug.as_deref()).await?)
                } else {
                    None
                };
                self.bulk
                    .finalize_member(
                        position,
                        temp_path,
                        original_name,
                        observed_bytes,
                        mime_type,
                        slug,
                        secret_hash,
                        expires_at,
                        identity,
                    )
                    .await
            }
        }
    }

    async fn finalize_single(
        &self,
        temp_path: PathBuf,
        original_name: String,
        slug: String,
        secret_hash: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        identity: IdentityContext,
    ) -> Result<FinalizedShare, AppError> {
        let mut share = self
            .store
            .create_share(NewShare {
                id: None,
                slug,
                kind: ShareKind::File,
                owner_id: identity.user_id,
                source_address: identity.source_address,
                secret_hash,
                expires_at,
                is_bulk: false,
            })
            .await?;

        let file_name = format!("{}_{}", share.id, sanitize_filename(&original_name));
        let final_path = self.upload_root.join(&file_name);

        fs::rename(&temp_path, &final_path).await.map_err(|e| {
            AppError::Internal(format!(
                "Failed to move upload into place at {}: {}",
                final_path.display(),
                e
            ))
        })?;

        if let Err(err) = self.store.set_share_file_name(share.id, &file_name).await {
            // The rename already happened; take the permanent file back out
            // so no unreferenced file survives.
            remove_if_present(&final_path).await;
            return Err(err);
        }
        share.file_name = Some(file_name.clone());

        tracing::info!(
            share_id = %share.id,
            slug = %share.slug,
            file = %file_name,
            "share finalized"
        );
        Ok(FinalizedShare {
            share,
            file_name,
            original_name,
        })
    }

    /// Resolve the slug for a new share: check a caller-chosen slug for
    /// availability, or draw random ones until a free one turns up. The
    /// store's unique constraint stays the final authority for races past
    /// this lookup.
    async fn resolve_slug(&self, requested: Option<&str>) -> Result<String, AppError> {
        if let Some(slug) = requested {
            validate_slug(slug)?;
            if self.store.slug_exists(slug).await? {
                return Err(AppError::SlugTaken(slug.to_string()));
            }
            return Ok(slug.to_string());
        }
        for _ in 0..MAX_SLUG_ATTEMPTS {
            let candidate = random_slug(GENERATED_SLUG_LENGTH);
            if !self.store.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(AppError::Internal(format!(
            "No free slug after {} attempts",
            MAX_SLUG_ATTEMPTS
        )))
    }
}

/// Generate a random URL-safe slug.
fn random_slug(length: usize) -> String {
    use rand::Rng;

    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Hash a share secret for storage. The plaintext never goes further than
/// this function.
pub fn hash_secret(secret: &str) -> Result<String, AppError> {
    validate_secret(secret)?;
    bcrypt::hash(secret, SECRET_HASH_COST)
        .map_err(|e| AppError::Internal(format!("Failed to hash share secret: {}", e)))
}

/// Verify a presented secret against a stored hash.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, AppError> {
    bcrypt::verify(secret, hash)
        .map_err(|e| AppError::Internal(format!("Failed to verify share secret: {}", e)))
}
