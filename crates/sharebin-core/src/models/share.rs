use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Share kind. The ingestion subsystem only ever creates FILE shares; the
/// surrounding application owns the other kinds (links, pastes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShareKind {
    File,
}

impl ShareKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareKind::File => "FILE",
        }
    }
}

impl TryFrom<String> for ShareKind {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "FILE" => Ok(ShareKind::File),
            other => Err(AppError::Validation(format!(
                "Unknown share kind '{}'",
                other
            ))),
        }
    }
}

/// Persisted share record.
///
/// `file_name` is relative to the upload root. It is NULL while the file has
/// not landed yet and stays NULL for bulk parents, whose files live in
/// `share_files`.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Share {
    pub id: Uuid,
    pub slug: String,
    #[sqlx(try_from = "String")]
    pub kind: ShareKind,
    pub file_name: Option<String>,
    pub owner_id: Option<Uuid>,
    pub source_address: String,
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_bulk: bool,
    pub created_at: DateTime<Utc>,
}

impl Share {
    pub fn has_password(&self) -> bool {
        self.secret_hash.is_some()
    }
}

/// Input for creating a share record.
#[derive(Debug, Clone)]
pub struct NewShare {
    /// Explicit id, used when the client supplies the bulk share id.
    /// None lets the store assign one.
    pub id: Option<Uuid>,
    pub slug: String,
    pub kind: ShareKind,
    pub owner_id: Option<Uuid>,
    pub source_address: String,
    pub secret_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_bulk: bool,
}

/// File attached to a bulk share, one row per finalized file.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ShareFile {
    pub id: Uuid,
    pub share_id: Uuid,
    pub file_name: String,
    pub original_name: String,
    pub relative_path: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for attaching a file to a bulk share.
#[derive(Debug, Clone)]
pub struct NewShareFile {
    pub share_id: Uuid,
    pub file_name: String,
    pub original_name: String,
    pub relative_path: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
}

/// Wire shape of a finalized share in upload responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: ShareKind,
    /// Original filename as supplied by the uploader.
    pub filename: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_password: bool,
}

/// Response body for a successful single-shot upload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShareCreatedResponse {
    pub share: ShareSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_kind_round_trip() {
        assert_eq!(ShareKind::File.as_str(), "FILE");
        assert_eq!(
            ShareKind::try_from("FILE".to_string()).unwrap(),
            ShareKind::File
        );
        assert!(ShareKind::try_from("LINK".to_string()).is_err());
    }

    #[test]
    fn share_summary_uses_camel_case_wire_names() {
        let summary = ShareSummary {
            slug: "my-report".to_string(),
            kind: ShareKind::File,
            filename: "report.pdf".to_string(),
            expires_at: None,
            has_password: true,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "FILE");
        assert_eq!(json["hasPassword"], true);
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("has_password").is_none());
    }

    #[test]
    fn share_never_serializes_secret_hash() {
        let share = Share {
            id: Uuid::new_v4(),
            slug: "abc123".to_string(),
            kind: ShareKind::File,
            file_name: None,
            owner_id: None,
            source_address: "203.0.113.9".to_string(),
            secret_hash: Some("$2b$12$abcdefgh".to_string()),
            expires_at: None,
            is_bulk: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&share).unwrap();
        assert!(json.get("secret_hash").is_none());
    }
}
