//! Session token encoding and decoding.
//!
//! Accounts are managed by the surrounding application; this module only
//! validates the HS256 tokens it issues so uploads can be attributed to an
//! account tier.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sharebin_core::AppError;
use uuid::Uuid;

/// Cookie that carries the session token for browser clients.
pub const TOKEN_COOKIE: &str = "sharebin_token";

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Account id as a UUID string.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issue a session token for an account.
#[allow(dead_code)]
pub fn create_token(user_id: Uuid, secret: &str, expiry_hours: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: (now + Duration::hours(expiry_hours)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))
}

/// Decode and validate a session token, including its expiry.
pub fn decode_token(token: &str, secret: &str) -> Result<JwtClaims, AppError> {
    decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid session token: {}", e)))
}
