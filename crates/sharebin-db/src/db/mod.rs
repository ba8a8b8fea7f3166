//! Database repositories

mod share;
mod share_file;

pub use share::ShareRepository;
pub use share_file::ShareFileRepository;

/// Postgres error code for unique_violation.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";
/// Postgres error code for foreign_key_violation.
pub(crate) const FOREIGN_KEY_VIOLATION: &str = "23503";

/// The Postgres error code of a database error, if any.
pub(crate) fn pg_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.to_string()),
        _ => None,
    }
}

/// The violated constraint name of a database error, if any.
pub(crate) fn pg_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(|c| c.to_string()),
        _ => None,
    }
}
