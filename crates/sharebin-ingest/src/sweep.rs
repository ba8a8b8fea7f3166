//! Periodic cleanup of abandoned partial uploads.
//!
//! Terminal transfer paths delete their own partials; the sweep only
//! catches `.part` files orphaned by a crash or by a resumable client that
//! never came back.

use std::path::Path;
use std::time::Duration;

use sharebin_core::AppError;
use tokio::fs;

use crate::stream::TMP_DIR;

/// Delete `.part` files older than `ttl` under the upload temp directory.
/// Returns how many were removed.
pub async fn sweep_stale_parts(upload_root: &Path, ttl: Duration) -> Result<u64, AppError> {
    let tmp = upload_root.join(TMP_DIR);
    let mut entries = fs::read_dir(&tmp)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", tmp.display(), e)))?;

    let mut removed = 0u64;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", tmp.display(), e)))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("part") {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        // A clock-skewed future mtime reads as not stale.
        let Ok(age) = modified.elapsed() else {
            continue;
        };
        if age >= ttl {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(path = %path.display(), "removed stale partial upload");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove stale partial")
                }
            }
        }
    }
    Ok(removed)
}
