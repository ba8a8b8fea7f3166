//! Caller-supplied transfer metadata.
//!
//! Both transports carry the same fields: multipart requests as form fields,
//! resumable requests packed into the `Upload-Metadata` header as
//! comma-separated `key base64(value)` pairs.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use sharebin_core::models::{IdentityContext, ShareKind};
use sharebin_core::validation::{
    validate_filename, validate_relative_path, validate_requested_expiry, validate_secret,
    validate_slug,
};
use sharebin_core::AppError;
use uuid::Uuid;

/// Hard cap on buffered metadata fields per transfer.
pub const MAX_METADATA_FIELDS: usize = 32;
/// Hard cap on a single metadata value.
pub const MAX_METADATA_VALUE_BYTES: usize = 4096;

/// Position of one file inside a bulk set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPosition {
    /// Client-chosen id of the parent share; the first file creates it,
    /// every later file attaches to it.
    pub share_id: Uuid,
    pub file_index: u32,
    pub total_files: u32,
    pub relative_path: Option<String>,
}

impl BulkPosition {
    pub fn is_first(&self) -> bool {
        self.file_index == 0
    }
}

/// Parsed metadata for one transfer, valid for both transports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferMetadata {
    /// Declared share kind. Required on multipart requests.
    pub kind: Option<ShareKind>,
    /// Target filename. Required on resumable sessions, where no multipart
    /// file part carries it.
    pub filename: Option<String>,
    pub slug: Option<String>,
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub bulk: Option<BulkPosition>,
}

impl TransferMetadata {
    /// Build metadata from raw key/value fields. Unknown keys are ignored;
    /// known keys must parse.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, AppError> {
        let kind = match fields.get("type") {
            Some(raw) => Some(ShareKind::try_from(raw.clone())?),
            None => None,
        };

        let expires_at = match fields.get("expiresAt") {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| {
                        AppError::Validation(format!("Invalid expiresAt instant '{}'", raw))
                    })?,
            ),
            None => None,
        };

        let is_bulk = fields
            .get("isBulk")
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        let bulk = if is_bulk {
            Some(parse_bulk_position(fields)?)
        } else {
            None
        };

        Ok(Self {
            kind,
            filename: fields.get("filename").cloned(),
            slug: fields.get("slug").cloned(),
            password: fields.get("password").cloned(),
            expires_at,
            bulk,
        })
    }

    /// Checks shared by both transports: slug, secret, expiry, and bulk
    /// relative path, each rejected before any finalize work starts.
    fn validate_common(
        &self,
        identity: &IdentityContext,
        anon_expiry_max_days: i64,
    ) -> Result<(), AppError> {
        if let Some(slug) = &self.slug {
            validate_slug(slug)?;
        }
        if let Some(secret) = &self.password {
            validate_secret(secret)?;
        }
        if let Some(at) = self.expires_at {
            validate_requested_expiry(at, identity.is_authenticated, anon_expiry_max_days)?;
        }
        if let Some(bulk) = &self.bulk {
            if let Some(path) = &bulk.relative_path {
                validate_relative_path(path)?;
            }
        }
        Ok(())
    }

    /// Validate metadata arriving as multipart form fields, where the share
    /// kind is a required field and the filename rides on the file part.
    pub fn validate_multipart(
        &self,
        identity: &IdentityContext,
        anon_expiry_max_days: i64,
    ) -> Result<(), AppError> {
        if self.kind.is_none() {
            return Err(AppError::Validation(
                "Missing required field 'type'".to_string(),
            ));
        }
        self.validate_common(identity, anon_expiry_max_days)
    }

    /// Validate metadata for a resumable session, where the filename must be
    /// declared up front because no file part ever names it.
    pub fn validate_resumable(
        &self,
        identity: &IdentityContext,
        anon_expiry_max_days: i64,
    ) -> Result<(), AppError> {
        match &self.filename {
            Some(name) => validate_filename(name)?,
            None => {
                return Err(AppError::Validation(
                    "Missing required metadata field 'filename'".to_string(),
                ))
            }
        }
        self.validate_common(identity, anon_expiry_max_days)
    }
}

fn parse_bulk_position(fields: &HashMap<String, String>) -> Result<BulkPosition, AppError> {
    let share_id = fields
        .get("bulkShareId")
        .ok_or_else(|| AppError::Validation("isBulk requires bulkShareId".to_string()))?;
    let share_id = Uuid::parse_str(share_id)
        .map_err(|_| AppError::Validation(format!("Invalid bulkShareId '{}'", share_id)))?;

    let file_index = parse_u32_field(fields, "fileIndex")?;
    let total_files = parse_u32_field(fields, "totalFiles")?;
    if total_files == 0 {
        return Err(AppError::Validation(
            "totalFiles must be at least 1".to_string(),
        ));
    }
    if file_index >= total_files {
        return Err(AppError::Validation(format!(
            "fileIndex {} out of range for {} files",
            file_index, total_files
        )));
    }

    Ok(BulkPosition {
        share_id,
        file_index,
        total_files,
        relative_path: fields.get("relativePath").cloned(),
    })
}

fn parse_u32_field(fields: &HashMap<String, String>, key: &str) -> Result<u32, AppError> {
    let raw = fields
        .get(key)
        .ok_or_else(|| AppError::Validation(format!("isBulk requires {}", key)))?;
    raw.parse::<u32>()
        .map_err(|_| AppError::Validation(format!("Invalid {} '{}'", key, raw)))
}

/// Parse an `Upload-Metadata` header: comma-separated `key base64(value)`
/// pairs, value optional for flag-style keys.
pub fn parse_upload_metadata(header: &str) -> Result<HashMap<String, String>, AppError> {
    let mut fields = HashMap::new();
    for pair in header.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.split_whitespace();
        let key = parts
            .next()
            .ok_or_else(|| AppError::Validation("Malformed Upload-Metadata header".to_string()))?;
        let value = match parts.next() {
            Some(encoded) => {
                let decoded = STANDARD.decode(encoded).map_err(|_| {
                    AppError::Validation(format!(
                        "Upload-Metadata value for '{}' is not valid base64",
                        key
                    ))
                })?;
                String::from_utf8(decoded).map_err(|_| {
                    AppError::Validation(format!(
                        "Upload-Metadata value for '{}' is not valid UTF-8",
                        key
                    ))
                })?
            }
            None => String::new(),
        };
        if parts.next().is_some() {
            return Err(AppError::Validation(
                "Malformed Upload-Metadata header".to_string(),
            ));
        }
        if value.len() > MAX_METADATA_VALUE_BYTES {
            return Err(AppError::Validation(format!(
                "Upload-Metadata value for '{}' exceeds {} bytes",
                key, MAX_METADATA_VALUE_BYTES
            )));
        }
        fields.insert(key.to_string(), value);
        if fields.len() > MAX_METADATA_FIELDS {
            return Err(AppError::Validation(format!(
                "Too many Upload-Metadata fields (max {})",
                MAX_METADATA_FIELDS
            )));
        }
    }
    Ok(fields)
}
