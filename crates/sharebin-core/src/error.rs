//! Error types module
//!
//! This module provides the core error types used throughout the Sharebin
//! ingestion subsystem. All errors are unified under the `AppError` enum,
//! which can represent validation, limit, conflict, database, and internal
//! errors along with the metadata needed to render them over HTTP.

use std::io;

use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "QUOTA_EXCEEDED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slug already taken: {0}")]
    SlugTaken(String),

    #[error("Share already exists: {0}")]
    ShareExists(uuid::Uuid),

    #[error("File too large: {observed} bytes exceeds the {limit} byte limit")]
    FileTooLarge { observed: u64, limit: u64 },

    #[error("Quota exceeded: {used} of {quota} bytes already in use")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("Upload session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("Upload session busy: {0}")]
    SessionBusy(uuid::Uuid),

    #[error("Upload offset mismatch: expected {expected}, got {provided}")]
    OffsetMismatch { expected: u64, provided: u64 },

    #[error("Unsupported media type: expected {0}")]
    UnsupportedMediaType(&'static str),

    #[error("Bulk parent share missing: {0}")]
    BulkParentMissing(uuid::Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

// Error conversion implementations following Rust best practices
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// Reduces duplication in ErrorMetadata impl; client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Validation(_) => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::SlugTaken(_) => (
            409,
            "SLUG_TAKEN",
            false,
            Some("Pick a different slug or omit it to get a generated one"),
            false,
            LogLevel::Debug,
        ),
        AppError::ShareExists(_) => (
            409,
            "SHARE_EXISTS",
            false,
            Some("Use a fresh bulk share id for a new bulk set"),
            false,
            LogLevel::Debug,
        ),
        AppError::FileTooLarge { .. } => (
            413,
            "FILE_TOO_LARGE",
            false,
            Some("Reduce the file size or sign in for a higher limit"),
            false,
            LogLevel::Debug,
        ),
        AppError::QuotaExceeded { .. } => (
            429,
            "QUOTA_EXCEEDED",
            false,
            Some("Delete old shares or wait for them to expire"),
            false,
            LogLevel::Warn,
        ),
        AppError::SessionNotFound(_) => (
            404,
            "SESSION_NOT_FOUND",
            false,
            Some("Create a new upload session"),
            false,
            LogLevel::Debug,
        ),
        AppError::SessionBusy(_) => (
            409,
            "SESSION_BUSY",
            true,
            Some("Wait for the in-flight request on this session to finish"),
            false,
            LogLevel::Debug,
        ),
        AppError::OffsetMismatch { .. } => (
            409,
            "OFFSET_MISMATCH",
            true,
            Some("Query the current offset and resume from there"),
            false,
            LogLevel::Debug,
        ),
        AppError::UnsupportedMediaType(_) => (
            415,
            "UNSUPPORTED_MEDIA_TYPE",
            false,
            Some("Send the body as application/offset+octet-stream"),
            false,
            LogLevel::Debug,
        ),
        AppError::BulkParentMissing(_) => (
            500,
            "BULK_PARENT_MISSING",
            false,
            Some("Start the bulk upload again"),
            true,
            LogLevel::Error,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Check the session token"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Validation(_) => "Validation",
            AppError::SlugTaken(_) => "SlugTaken",
            AppError::ShareExists(_) => "ShareExists",
            AppError::FileTooLarge { .. } => "FileTooLarge",
            AppError::QuotaExceeded { .. } => "QuotaExceeded",
            AppError::SessionNotFound(_) => "SessionNotFound",
            AppError::SessionBusy(_) => "SessionBusy",
            AppError::OffsetMismatch { .. } => "OffsetMismatch",
            AppError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            AppError::BulkParentMissing(_) => "BulkParentMissing",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        // Add source error chain
        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Validation(ref msg) => msg.clone(),
            AppError::SlugTaken(ref slug) => format!("Slug '{}' is already taken", slug),
            AppError::ShareExists(id) => format!("Share {} already exists", id),
            AppError::FileTooLarge { observed, limit } => {
                format!(
                    "File too large: {} bytes exceeds the {} byte limit",
                    observed, limit
                )
            }
            // The quota message always carries current usage and the ceiling
            // so a client can tell how much room is left.
            AppError::QuotaExceeded { used, quota } => {
                format!(
                    "Upload quota exceeded: {} of {} bytes already in use",
                    used, quota
                )
            }
            AppError::SessionNotFound(id) => format!("Upload session {} not found", id),
            AppError::SessionBusy(id) => {
                format!("Upload session {} has a request in flight", id)
            }
            AppError::OffsetMismatch { expected, provided } => {
                format!(
                    "Upload offset mismatch: expected {}, got {}",
                    expected, provided
                )
            }
            AppError::UnsupportedMediaType(expected) => {
                format!("Unsupported media type: expected {}", expected)
            }
            AppError::BulkParentMissing(_) => "Failed to finalize bulk upload".to_string(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}
