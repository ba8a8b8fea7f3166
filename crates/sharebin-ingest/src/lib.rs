//! Streaming file ingestion: limit-checked transfer engine, resumable
//! session bookkeeping, and atomic finalization into shares.

pub mod bulk;
pub mod context;
pub mod finalize;
pub mod limits;
pub mod metadata;
pub mod quota;
pub mod session;
pub mod stream;
pub mod sweep;

pub use context::IdentityVault;
pub use finalize::{hash_secret, verify_secret, FinalizeRequest, FinalizedShare, UploadFinalizer};
pub use limits::LimitResolver;
pub use metadata::{parse_upload_metadata, BulkPosition, TransferMetadata};
pub use quota::QuotaLedger;
pub use session::{ResumableSession, SessionVault};
pub use stream::{
    ensure_upload_dirs, part_path, AcceptedFile, FinishedTransfer, IngestStream, TMP_DIR,
};
pub use sweep::sweep_stale_parts;
