//! Data models for the ingestion subsystem
//!
//! Organized by domain: persisted share records, caller identity, and the
//! byte-ceiling envelope computed per transfer.

mod identity;
mod limits;
mod share;

// Re-export all models for convenient imports
pub use identity::*;
pub use limits::*;
pub use share::*;
