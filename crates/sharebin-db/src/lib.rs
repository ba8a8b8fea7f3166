//! Sharebin database layer
//!
//! Postgres repositories for shares and share files, plus the
//! `PgShareStore` adapter that exposes them through the `ShareStore`
//! interface consumed by the ingestion subsystem.

pub mod db;
pub mod store;

pub use db::{ShareFileRepository, ShareRepository};
pub use store::PgShareStore;
