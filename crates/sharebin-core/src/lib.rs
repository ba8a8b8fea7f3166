//! Sharebin Core Library
//!
//! This crate provides the domain models, error types, configuration,
//! validation, and the persisted-store interface shared across all Sharebin
//! components.

pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, IngestConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use store::{MemoryShareStore, ShareStore};
