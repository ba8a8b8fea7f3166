//! API constants
//!
//! Versioned path prefixes shared by the router, the handlers, and the
//! OpenAPI annotations. Handler path annotations must use the same literal
//! prefix because utoipa requires compile-time strings.

#![allow(dead_code)]

/// API base path prefix (version-independent)
pub const API_BASE: &str = "/api";

/// Current API version
pub const API_VERSION: &str = "v0";

/// Versioned API path prefix
pub const API_PREFIX: &str = "/api/v0";
