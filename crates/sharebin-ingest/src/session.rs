//! Resumable session vault.
//!
//! A resumable transfer's state between requests lives here, keyed by
//! session id. `take` hands a session to exactly one request at a time; a
//! concurrent taker gets a busy error instead of a second handle, which is
//! what keeps two interleaved PATCHes from appending to the same partial.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sharebin_core::models::LimitEnvelope;
use sharebin_core::AppError;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metadata::TransferMetadata;

/// State of a parked resumable transfer.
#[derive(Debug, Clone)]
pub struct ResumableSession {
    pub id: Uuid,
    /// Total size declared at creation, or None while the client defers it.
    pub declared_size: Option<u64>,
    pub observed_bytes: u64,
    /// Ceilings computed once at creation and enforced for the session's
    /// whole lifetime.
    pub envelope: LimitEnvelope,
    pub metadata: TransferMetadata,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
}

impl ResumableSession {
    pub fn is_complete(&self) -> bool {
        self.declared_size
            .is_some_and(|declared| declared == self.observed_bytes)
    }
}

#[derive(Default)]
struct VaultInner {
    parked: HashMap<Uuid, ResumableSession>,
    leased: HashSet<Uuid>,
}

/// Concurrency-safe home for parked sessions.
#[derive(Default)]
pub struct SessionVault {
    inner: Mutex<VaultInner>,
}

impl SessionVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a session, releasing any lease held for its id.
    pub async fn put(&self, session: ResumableSession) {
        let mut inner = self.inner.lock().await;
        inner.leased.remove(&session.id);
        inner.parked.insert(session.id, session);
    }

    /// Take exclusive hold of a parked session. While held, other takers
    /// see a busy error; unknown ids a not-found error.
    pub async fn take(&self, id: Uuid) -> Result<ResumableSession, AppError> {
        let mut inner = self.inner.lock().await;
        match inner.parked.remove(&id) {
            Some(session) => {
                inner.leased.insert(id);
                Ok(session)
            }
            None if inner.leased.contains(&id) => Err(AppError::SessionBusy(id)),
            None => Err(AppError::SessionNotFound(id)),
        }
    }

    pub async fn has(&self, id: Uuid) -> bool {
        let inner = self.inner.lock().await;
        inner.parked.contains_key(&id) || inner.leased.contains(&id)
    }

    /// Observed offset and declared size of a parked session, for status
    /// probes that must not disturb the session.
    pub async fn offset(&self, id: Uuid) -> Result<(u64, Option<u64>), AppError> {
        let inner = self.inner.lock().await;
        if let Some(session) = inner.parked.get(&id) {
            Ok((session.observed_bytes, session.declared_size))
        } else if inner.leased.contains(&id) {
            Err(AppError::SessionBusy(id))
        } else {
            Err(AppError::SessionNotFound(id))
        }
    }

    /// Forget a session for good, parked or leased.
    pub async fn retire(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.parked.remove(&id);
        inner.leased.remove(&id);
    }
}
