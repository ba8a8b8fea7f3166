//! Rolling quota ledger.
//!
//! Usage is derived, never stored: single-file shares are measured from the
//! file on disk, bulk shares from the recorded sizes of their attached
//! files. Every reading is a point-in-time snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sharebin_core::{AppError, ShareStore};
use tokio::fs;

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn ShareStore>,
    upload_root: PathBuf,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn ShareStore>, upload_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            upload_root: upload_root.into(),
        }
    }

    /// Bytes currently attributed to a source address across all of its
    /// FILE shares.
    pub async fn usage(&self, source_address: &str) -> Result<u64, AppError> {
        let shares = self
            .store
            .list_file_shares_by_source(source_address)
            .await?;
        let mut total: u64 = 0;
        for share in &shares {
            let bytes = if share.is_bulk {
                self.store.sum_share_file_sizes(share.id).await?
            } else if let Some(file_name) = &share.file_name {
                file_size_or_zero(&self.upload_root.join(file_name)).await
            } else {
                // Created but never landed; holds no bytes.
                0
            };
            total = total.saturating_add(bytes);
        }
        Ok(total)
    }
}

/// Size of a file, or zero when it cannot be statted. A file deleted out
/// from under its share must not pin the owner's quota.
async fn file_size_or_zero(path: &Path) -> u64 {
    match fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    }
}
