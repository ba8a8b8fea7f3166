//! Bulk-set coordination: many files landing under one share.
//!
//! The client drives a bulk set as a sequence of ordinary transfers that
//! share a `bulkShareId`. The first member creates the parent share under
//! that id; every later member attaches a `ShareFile` row to it. The parent
//! can be deleted while members are still in flight, so attachment
//! re-checks the parent and compensates by deleting its own permanent file
//! when the row cannot land.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sharebin_core::models::{IdentityContext, NewShare, NewShareFile, Share, ShareKind};
use sharebin_core::validation::{sanitize_filename, sanitize_relative_path};
use sharebin_core::{AppError, ShareStore};
use tokio::fs;

use crate::finalize::FinalizedShare;
use crate::metadata::BulkPosition;
use crate::stream::remove_if_present;

#[derive(Clone)]
pub struct BulkCoordinator {
    store: Arc<dyn ShareStore>,
    upload_root: PathBuf,
}

impl BulkCoordinator {
    pub(crate) fn new(store: Arc<dyn ShareStore>, upload_root: PathBuf) -> Self {
        Self { store, upload_root }
    }

    /// Finalize one member of a bulk set.
    ///
    /// The permanent name is derived from the parent id and the sanitized
    /// relative path, so members differing only by directory still land
    /// under distinct names. The insert is the authoritative parent check:
    /// a foreign-key failure there deletes the just-renamed permanent file
    /// before the error surfaces.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn finalize_member(
        &self,
        position: BulkPosition,
        temp_path: PathBuf,
        original_name: String,
        observed_bytes: u64,
        mime_type: Option<String>,
        slug: Option<String>,
        secret_hash: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        identity: IdentityContext,
    ) -> Result<FinalizedShare, AppError> {
        let share = if position.is_first() {
            let slug = slug.ok_or_else(|| {
                AppError::Internal("First bulk member reached the coordinator without a slug".to_string())
            })?;
            self.store
                .create_share(NewShare {
                    id: Some(position.share_id),
                    slug,
                    kind: ShareKind::File,
                    owner_id: identity.user_id,
                    source_address: identity.source_address.clone(),
                    secret_hash,
                    expires_at,
                    is_bulk: true,
                })
                .await?
        } else {
            match self.store.find_share_by_id(position.share_id).await? {
                Some(share) if share.is_bulk => share,
                Some(_) => {
                    return Err(AppError::Validation(format!(
                        "Share {} is not a bulk share",
                        position.share_id
                    )))
                }
                None => return Err(AppError::BulkParentMissing(position.share_id)),
            }
        };

        let display_name = position
            .relative_path
            .clone()
            .unwrap_or_else(|| original_name.clone());
        let file_name = if position.relative_path.is_some() {
            format!("{}_{}", share.id, sanitize_relative_path(&display_name))
        } else {
            format!("{}_{}", share.id, sanitize_filename(&original_name))
        };
        let final_path = self.upload_root.join(&file_name);

        match fs::try_exists(&final_path).await {
            Ok(false) => {}
            Ok(true) => {
                return Err(AppError::Validation(format!(
                    "File '{}' already exists in this bulk share",
                    display_name
                )))
            }
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Failed to check {}: {}",
                    final_path.display(),
                    e
                )))
            }
        }

        fs::rename(&temp_path, &final_path).await.map_err(|e| {
            AppError::Internal(format!(
                "Failed to move upload into place at {}: {}",
                final_path.display(),
                e
            ))
        })?;

        let attached = self
            .store
            .insert_share_file(NewShareFile {
                share_id: share.id,
                file_name: file_name.clone(),
                original_name: original_name.clone(),
                relative_path: display_name,
                size_bytes: observed_bytes as i64,
                mime_type,
            })
            .await;
        if let Err(err) = attached {
            remove_if_present(&final_path).await;
            return Err(err);
        }

        tracing::info!(
            share_id = %share.id,
            file = %file_name,
            index = position.file_index,
            of = position.total_files,
            bytes = observed_bytes,
            "bulk member attached"
        );
        Ok(FinalizedShare {
            share,
            file_name,
            original_name,
        })
    }
}
