//! Per-session limit resolution.

use sharebin_core::models::{IdentityContext, LimitEnvelope, LimitTier};
use sharebin_core::AppError;

use crate::quota::QuotaLedger;

/// Resolves the limit envelope for a new transfer session: pick the tier
/// matching the caller's authentication state, read usage from the ledger
/// once, derive the ceilings.
#[derive(Clone)]
pub struct LimitResolver {
    ledger: QuotaLedger,
    anonymous: LimitTier,
    account: LimitTier,
}

impl LimitResolver {
    pub fn new(ledger: QuotaLedger, anonymous: LimitTier, account: LimitTier) -> Self {
        Self {
            ledger,
            anonymous,
            account,
        }
    }

    pub async fn resolve(&self, identity: &IdentityContext) -> Result<LimitEnvelope, AppError> {
        let tier = if identity.is_authenticated {
            self.account
        } else {
            self.anonymous
        };
        let usage = self.ledger.usage(&identity.source_address).await?;
        let envelope = LimitEnvelope::from_tier(tier, usage);
        tracing::debug!(
            source = %identity.source_address,
            authenticated = identity.is_authenticated,
            usage_bytes = usage,
            effective_max_bytes = envelope.effective_max_bytes,
            "resolved limit envelope"
        );
        Ok(envelope)
    }
}
