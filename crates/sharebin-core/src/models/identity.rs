use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller identity captured once when a transfer starts.
///
/// Immutable after capture: the session that captured it owns it, and
/// completion-time code receives it either as an explicit argument or from
/// the session-keyed identity vault, never from shared global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityContext {
    /// Network source address, resolved with the forwarded-header precedence
    /// order; quota usage is attributed to this value.
    pub source_address: String,
    pub user_id: Option<Uuid>,
    pub is_authenticated: bool,
}

impl IdentityContext {
    pub fn anonymous(source_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            user_id: None,
            is_authenticated: false,
        }
    }

    pub fn authenticated(source_address: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            source_address: source_address.into(),
            user_id: Some(user_id),
            is_authenticated: true,
        }
    }
}
