//! Session-keyed identity vault.
//!
//! Single-shot transfers hand `IdentityContext` down the call tree as a
//! plain argument. Resumable transfers cannot: completion runs in a later
//! request on a different connection. The identity captured at creation is
//! parked here under the session id and taken exactly once when the final
//! chunk lands, so entries never outlive their session.

use std::collections::HashMap;

use sharebin_core::models::IdentityContext;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct IdentityVault {
    inner: Mutex<HashMap<Uuid, IdentityContext>>,
}

impl IdentityVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, session_id: Uuid, identity: IdentityContext) {
        self.inner.lock().await.insert(session_id, identity);
    }

    /// Take the identity parked for a session, consuming the entry.
    pub async fn take(&self, session_id: Uuid) -> Option<IdentityContext> {
        self.inner.lock().await.remove(&session_id)
    }

    pub async fn has(&self, session_id: Uuid) -> bool {
        self.inner.lock().await.contains_key(&session_id)
    }
}
