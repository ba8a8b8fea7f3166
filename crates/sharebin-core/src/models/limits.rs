use serde::Serialize;

/// Byte ceilings for one authentication tier, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitTier {
    pub max_file_bytes: u64,
    pub quota_bytes: u64,
}

/// Effective byte ceilings for one transfer session.
///
/// Computed fresh for every new session from the tier ceilings and the
/// ledger's current usage reading; cached within the session, never across
/// sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitEnvelope {
    pub per_file_max_bytes: u64,
    pub rolling_quota_bytes: u64,
    pub current_usage_bytes: u64,
    pub remaining_quota_bytes: u64,
    pub effective_max_bytes: u64,
}

impl LimitEnvelope {
    /// Derive the envelope from a tier and the ledger's usage snapshot:
    /// `remaining = max(0, quota - usage)`, `effective = min(per_file, remaining)`.
    pub fn from_tier(tier: LimitTier, current_usage_bytes: u64) -> Self {
        let remaining_quota_bytes = tier.quota_bytes.saturating_sub(current_usage_bytes);
        Self {
            per_file_max_bytes: tier.max_file_bytes,
            rolling_quota_bytes: tier.quota_bytes,
            current_usage_bytes,
            remaining_quota_bytes,
            effective_max_bytes: tier.max_file_bytes.min(remaining_quota_bytes),
        }
    }

    /// True when no transfer should be started at all: the caller must be
    /// refused before any byte is read.
    pub fn quota_exhausted(&self) -> bool {
        self.remaining_quota_bytes == 0
    }
}
