//! Input validation for upload metadata.
//!
//! Filename checks run before any byte is written; slug, secret, and expiry
//! checks run at session creation and again inside the finalizer.

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;

pub const MAX_FILENAME_LENGTH: usize = 255;
pub const MAX_RELATIVE_PATH_LENGTH: usize = 1024;
pub const MIN_SLUG_LENGTH: usize = 3;
pub const MAX_SLUG_LENGTH: usize = 64;
/// bcrypt truncates input beyond 72 bytes; longer secrets are rejected
/// instead of silently weakened.
pub const MAX_SECRET_BYTES: usize = 72;

/// Validate a proposed upload filename before accepting any file bytes.
/// Rejects empty names, path separators, parent-directory sequences, and
/// names longer than 255 characters.
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.trim().is_empty() {
        return Err(AppError::Validation("Filename cannot be empty".to_string()));
    }
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(AppError::Validation(format!(
            "Filename exceeds {} characters",
            MAX_FILENAME_LENGTH
        )));
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(AppError::Validation(
            "Filename contains invalid path characters".to_string(),
        ));
    }
    if filename.contains('\0') {
        return Err(AppError::Validation(
            "Filename contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

/// Sanitize a filename for use in a permanent on-disk name.
/// Every character other than ASCII alphanumerics, `.`, `-`, and `_` becomes
/// `_`, so the result can never reintroduce traversal characters. Falls back
/// to `file` when nothing usable remains.
pub fn sanitize_filename(filename: &str) -> String {
    let path = std::path::Path::new(filename);
    let filename_only = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches(['_', '.']).is_empty() {
        return "file".to_string();
    }

    sanitized
}

/// Validate a bulk-member relative path. Unlike a plain filename it may
/// contain `/` separators, but never traversal sequences, a leading
/// separator, or backslashes.
pub fn validate_relative_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(AppError::Validation(
            "Relative path cannot be empty".to_string(),
        ));
    }
    if path.len() > MAX_RELATIVE_PATH_LENGTH {
        return Err(AppError::Validation(format!(
            "Relative path exceeds {} characters",
            MAX_RELATIVE_PATH_LENGTH
        )));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains("..") || path.contains('\0') {
        return Err(AppError::Validation(
            "Relative path contains invalid path characters".to_string(),
        ));
    }
    Ok(())
}

/// Sanitize a bulk-member relative path into a single flat on-disk name.
/// Separators become `_` along with every other special character, so two
/// members differing only by directory still get distinct permanent names.
pub fn sanitize_relative_path(path: &str) -> String {
    let sanitized: String = path
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.trim_matches(['_', '.']).is_empty() {
        return "file".to_string();
    }

    sanitized
}

/// Validate a caller-requested slug: `[A-Za-z0-9_-]`, 3 to 64 characters.
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.len() < MIN_SLUG_LENGTH || slug.len() > MAX_SLUG_LENGTH {
        return Err(AppError::Validation(format!(
            "Slug must be between {} and {} characters",
            MIN_SLUG_LENGTH, MAX_SLUG_LENGTH
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::Validation(
            "Slug may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(())
}

/// Validate a share secret before hashing.
pub fn validate_secret(secret: &str) -> Result<(), AppError> {
    if secret.is_empty() {
        return Err(AppError::Validation("Password cannot be empty".to_string()));
    }
    if secret.len() > MAX_SECRET_BYTES {
        return Err(AppError::Validation(format!(
            "Password exceeds {} bytes",
            MAX_SECRET_BYTES
        )));
    }
    Ok(())
}

/// Validate a requested expiry on a user-facing create path.
///
/// Anonymous callers may not request an expiry in the past or beyond the
/// configured horizon; such requests are rejected here rather than silently
/// adjusted. Authenticated callers only need a future instant.
pub fn validate_requested_expiry(
    expires_at: DateTime<Utc>,
    is_authenticated: bool,
    anon_max_days: i64,
) -> Result<(), AppError> {
    let now = Utc::now();
    if expires_at <= now {
        return Err(AppError::Validation(
            "Expiry must be in the future".to_string(),
        ));
    }
    if !is_authenticated && expires_at > now + Duration::days(anon_max_days) {
        return Err(AppError::Validation(format!(
            "Anonymous shares cannot live longer than {} days",
            anon_max_days
        )));
    }
    Ok(())
}

/// Resolve the expiry to persist, as a finalize-time safety net.
///
/// Anonymous shares always end up with an expiry: a missing one gets the
/// default horizon, one beyond the maximum is clamped. Authenticated shares
/// keep whatever was requested (or none).
pub fn resolve_expiry(
    requested: Option<DateTime<Utc>>,
    is_authenticated: bool,
    anon_max_days: i64,
) -> Option<DateTime<Utc>> {
    if is_authenticated {
        return requested;
    }
    let horizon = Utc::now() + Duration::days(anon_max_days);
    match requested {
        Some(at) if at < horizon => Some(at),
        _ => Some(horizon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_filename_rejects_path_traversal() {
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("foo/bar.txt").is_err());
        assert!(validate_filename("foo\\bar.txt").is_err());
        assert!(validate_filename("..").is_err());
    }

    #[test]
    fn validate_filename_rejects_empty_and_oversized() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("   ").is_err());
        assert!(validate_filename(&"a".repeat(256)).is_err());
        assert!(validate_filename(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn validate_filename_accepts_ordinary_names() {
        assert!(validate_filename("report.pdf").is_ok());
        assert!(validate_filename("my-file_1.jpg").is_ok());
    }

    #[test]
    fn sanitize_filename_replaces_special_characters() {
        assert_eq!(sanitize_filename("my report (1).pdf"), "my_report__1_.pdf");
        assert_eq!(sanitize_filename("image.png"), "image.png");
        assert_eq!(sanitize_filename("docs/readme.md"), "readme.md");
        assert_eq!(sanitize_filename("übung.txt"), "_bung.txt");
    }

    #[test]
    fn sanitize_filename_falls_back_on_empty_result() {
        assert_eq!(sanitize_filename("***"), "file");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn validate_relative_path_allows_directories() {
        assert!(validate_relative_path("docs/readme.md").is_ok());
        assert!(validate_relative_path("a/b/c.txt").is_ok());
        assert!(validate_relative_path("plain.txt").is_ok());
        assert!(validate_relative_path("/abs/path.txt").is_err());
        assert!(validate_relative_path("a/../b.txt").is_err());
        assert!(validate_relative_path("a\\b.txt").is_err());
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn sanitize_relative_path_keeps_directory_distinction() {
        let a = sanitize_relative_path("a/readme.md");
        let b = sanitize_relative_path("b/readme.md");
        assert_ne!(a, b);
        assert_eq!(a, "a_readme.md");
        assert_eq!(sanitize_relative_path("x y/z.txt"), "x_y_z.txt");
        assert_eq!(sanitize_relative_path("///"), "file");
    }

    #[test]
    fn validate_slug_pattern() {
        assert!(validate_slug("my-report").is_ok());
        assert!(validate_slug("a_b_3").is_ok());
        assert!(validate_slug("ab").is_err());
        assert!(validate_slug(&"a".repeat(65)).is_err());
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("sneaky/../slug").is_err());
    }

    #[test]
    fn validate_secret_length() {
        assert!(validate_secret("hunter2").is_ok());
        assert!(validate_secret("").is_err());
        assert!(validate_secret(&"x".repeat(72)).is_ok());
        assert!(validate_secret(&"x".repeat(73)).is_err());
    }

    #[test]
    fn requested_expiry_rejected_beyond_anonymous_horizon() {
        let too_far = Utc::now() + Duration::days(30);
        assert!(validate_requested_expiry(too_far, false, 7).is_err());
        assert!(validate_requested_expiry(too_far, true, 7).is_ok());

        let fine = Utc::now() + Duration::days(3);
        assert!(validate_requested_expiry(fine, false, 7).is_ok());
    }

    #[test]
    fn requested_expiry_rejected_in_past() {
        let past = Utc::now() - Duration::hours(1);
        assert!(validate_requested_expiry(past, false, 7).is_err());
        assert!(validate_requested_expiry(past, true, 7).is_err());
    }

    #[test]
    fn resolve_expiry_clamps_anonymous() {
        let too_far = Utc::now() + Duration::days(30);
        let resolved = resolve_expiry(Some(too_far), false, 7).unwrap();
        assert!(resolved <= Utc::now() + Duration::days(7) + Duration::minutes(1));

        // Missing expiry gets the default horizon.
        let defaulted = resolve_expiry(None, false, 7).unwrap();
        assert!(defaulted > Utc::now() + Duration::days(6));

        // Authenticated callers keep their choice, including none.
        assert_eq!(resolve_expiry(None, true, 7), None);
        assert_eq!(resolve_expiry(Some(too_far), true, 7), Some(too_far));
    }

    #[test]
    fn resolve_expiry_keeps_near_anonymous_instants() {
        let near = Utc::now() + Duration::days(2);
        assert_eq!(resolve_expiry(Some(near), false, 7), Some(near));
    }
}
