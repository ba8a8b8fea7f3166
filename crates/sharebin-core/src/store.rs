//! Persisted-store interface for shares.
//!
//! The ingestion subsystem reaches the database only through `ShareStore`;
//! the Postgres implementation lives in `sharebin-db`. `MemoryShareStore`
//! is the in-process reference implementation: it documents the contract
//! (uniqueness, foreign-key behavior) and backs tests that need no external
//! services.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewShare, NewShareFile, Share, ShareFile};

/// Narrow store interface consumed by the ingestion subsystem: unique-aware
/// create/find/update/delete for shares and share files, plus the two
/// queries the quota ledger needs.
#[async_trait]
pub trait ShareStore: Send + Sync {
    /// Create a share. A slug collision yields `SlugTaken`; an explicit id
    /// collision yields `ShareExists`. The store's unique constraints are
    /// the final authority for races past any earlier lookup.
    async fn create_share(&self, new_share: NewShare) -> Result<Share, AppError>;

    async fn find_share_by_id(&self, id: Uuid) -> Result<Option<Share>, AppError>;

    async fn find_share_by_slug(&self, slug: &str) -> Result<Option<Share>, AppError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError>;

    /// Record the landed file of a single-file share.
    async fn set_share_file_name(&self, share_id: Uuid, file_name: &str) -> Result<(), AppError>;

    /// Delete a share (bulk children go with it). Returns whether a row
    /// existed.
    async fn delete_share(&self, id: Uuid) -> Result<bool, AppError>;

    /// Attach a file to a bulk share. A vanished parent yields
    /// `BulkParentMissing`; a duplicate file name within the share yields a
    /// validation error.
    async fn insert_share_file(&self, new_file: NewShareFile) -> Result<ShareFile, AppError>;

    async fn list_share_files(&self, share_id: Uuid) -> Result<Vec<ShareFile>, AppError>;

    /// All FILE-kind shares attributed to a source address, for quota
    /// accounting.
    async fn list_file_shares_by_source(
        &self,
        source_address: &str,
    ) -> Result<Vec<Share>, AppError>;

    /// Sum of recorded sizes of a bulk share's files.
    async fn sum_share_file_sizes(&self, share_id: Uuid) -> Result<u64, AppError>;
}

#[derive(Default)]
struct MemoryInner {
    shares: HashMap<Uuid, Share>,
    files: HashMap<Uuid, Vec<ShareFile>>,
}

/// In-memory `ShareStore` with the same uniqueness and FK semantics as the
/// Postgres store. Not durable; intended for tests and local experiments.
#[derive(Default)]
pub struct MemoryShareStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means another test thread panicked; the data
        // is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ShareStore for MemoryShareStore {
    async fn create_share(&self, new_share: NewShare) -> Result<Share, AppError> {
        let mut inner = self.lock();
        if inner.shares.values().any(|s| s.slug == new_share.slug) {
            return Err(AppError::SlugTaken(new_share.slug));
        }
        let id = new_share.id.unwrap_or_else(Uuid::new_v4);
        if inner.shares.contains_key(&id) {
            return Err(AppError::ShareExists(id));
        }
        let share = Share {
            id,
            slug: new_share.slug,
            kind: new_share.kind,
            file_name: None,
            owner_id: new_share.owner_id,
            source_address: new_share.source_address,
            secret_hash: new_share.secret_hash,
            expires_at: new_share.expires_at,
            is_bulk: new_share.is_bulk,
            created_at: Utc::now(),
        };
        inner.shares.insert(id, share.clone());
        Ok(share)
    }

    async fn find_share_by_id(&self, id: Uuid) -> Result<Option<Share>, AppError> {
        Ok(self.lock().shares.get(&id).cloned())
    }

    async fn find_share_by_slug(&self, slug: &str) -> Result<Option<Share>, AppError> {
        Ok(self
            .lock()
            .shares
            .values()
            .find(|s| s.slug == slug)
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        Ok(self.lock().shares.values().any(|s| s.slug == slug))
    }

    async fn set_share_file_name(&self, share_id: Uuid, file_name: &str) -> Result<(), AppError> {
        let mut inner = self.lock();
        match inner.shares.get_mut(&share_id) {
            Some(share) => {
                share.file_name = Some(file_name.to_string());
                Ok(())
            }
            None => Err(AppError::Internal(format!(
                "share {} vanished before its file reference was recorded",
                share_id
            ))),
        }
    }

    async fn delete_share(&self, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let existed = inner.shares.remove(&id).is_some();
        inner.files.remove(&id);
        Ok(existed)
    }

    async fn insert_share_file(&self, new_file: NewShareFile) -> Result<ShareFile, AppError> {
        let mut inner = self.lock();
        if !inner.shares.contains_key(&new_file.share_id) {
            return Err(AppError::BulkParentMissing(new_file.share_id));
        }
        let attached = inner.files.entry(new_file.share_id).or_default();
        if attached.iter().any(|f| f.file_name == new_file.file_name) {
            return Err(AppError::Validation(format!(
                "File '{}' already exists in this bulk share",
                new_file.file_name
            )));
        }
        let file = ShareFile {
            id: Uuid::new_v4(),
            share_id: new_file.share_id,
            file_name: new_file.file_name,
            original_name: new_file.original_name,
            relative_path: new_file.relative_path,
            size_bytes: new_file.size_bytes,
            mime_type: new_file.mime_type,
            created_at: Utc::now(),
        };
        attached.push(file.clone());
        Ok(file)
    }

    async fn list_share_files(&self, share_id: Uuid) -> Result<Vec<ShareFile>, AppError> {
        Ok(self.lock().files.get(&share_id).cloned().unwrap_or_default())
    }

    async fn list_file_shares_by_source(
        &self,
        source_address: &str,
    ) -> Result<Vec<Share>, AppError> {
        Ok(self
            .lock()
            .shares
            .values()
            .filter(|s| s.source_address == source_address)
            .cloned()
            .collect())
    }

    async fn sum_share_file_sizes(&self, share_id: Uuid) -> Result<u64, AppError> {
        Ok(self
            .lock()
            .files
            .get(&share_id)
            .map(|files| files.iter().map(|f| f.size_bytes.max(0) as u64).sum())
            .unwrap_or(0))
    }
}
