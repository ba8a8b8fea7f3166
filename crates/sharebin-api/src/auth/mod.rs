//! Caller identity: session tokens and source address extraction.

pub mod identity;
pub mod jwt;

pub use identity::{extract_client_ip, resolve_identity};
pub use jwt::{create_token, decode_token, JwtClaims, TOKEN_COOKIE};
