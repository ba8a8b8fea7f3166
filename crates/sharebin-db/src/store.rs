//! Postgres-backed `ShareStore`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use sharebin_core::models::{NewShare, NewShareFile, Share, ShareFile};
use sharebin_core::{AppError, ShareStore};

use crate::db::{ShareFileRepository, ShareRepository};

/// `ShareStore` over Postgres, composing the two repositories.
#[derive(Clone)]
pub struct PgShareStore {
    shares: ShareRepository,
    share_files: ShareFileRepository,
}

impl PgShareStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            shares: ShareRepository::new(pool.clone()),
            share_files: ShareFileRepository::new(pool),
        }
    }
}

#[async_trait]
impl ShareStore for PgShareStore {
    async fn create_share(&self, new_share: NewShare) -> Result<Share, AppError> {
        self.shares.create(new_share).await
    }

    async fn find_share_by_id(&self, id: Uuid) -> Result<Option<Share>, AppError> {
        self.shares.find_by_id(id).await
    }

    async fn find_share_by_slug(&self, slug: &str) -> Result<Option<Share>, AppError> {
        self.shares.find_by_slug(slug).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        self.shares.slug_exists(slug).await
    }

    async fn set_share_file_name(&self, share_id: Uuid, file_name: &str) -> Result<(), AppError> {
        self.shares.set_file_name(share_id, file_name).await
    }

    async fn delete_share(&self, id: Uuid) -> Result<bool, AppError> {
        self.shares.delete(id).await
    }

    async fn insert_share_file(&self, new_file: NewShareFile) -> Result<ShareFile, AppError> {
        self.share_files.insert(new_file).await
    }

    async fn list_share_files(&self, share_id: Uuid) -> Result<Vec<ShareFile>, AppError> {
        self.share_files.list_by_share(share_id).await
    }

    async fn list_file_shares_by_source(
        &self,
        source_address: &str,
    ) -> Result<Vec<Share>, AppError> {
        self.shares.list_file_shares_by_source(source_address).await
    }

    async fn sum_share_file_sizes(&self, share_id: Uuid) -> Result<u64, AppError> {
        self.share_files.sum_sizes(share_id).await
    }
}
