use log::*;

use crate::{
    db_types::{LedgerEntry, LoyaltyTier, NewLedgerEntry, Profile},
    traits::{BalanceAudit, Balances, LedgerError, LedgerManagement},
};

/// `LedgerApi` exposes the loyalty/wallet ledger: posting entries, reading balances and auditing the cache
/// against a full replay.
#[derive(Debug, Clone)]
pub struct LedgerApi<B> {
    db: B,
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    /// Post one entry. Zero-amount entries are rejected; sign conventions are the caller's responsibility
    /// (clawbacks are negative, gains positive), and the backend refuses any debit that would leave a balance
    /// negative.
    pub async fn post_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError> {
        if entry.customer_id.trim().is_empty() {
            return Err(LedgerError::ValidationError("customer_id must not be empty".to_string()));
        }
        if entry.amount.is_zero() {
            return Err(LedgerError::ValidationError("A ledger entry cannot have a zero amount".to_string()));
        }
        self.db.post_entry(entry).await
    }

    pub async fn balances(&self, customer_id: &str) -> Result<Balances, LedgerError> {
        self.db.fetch_balances(customer_id).await
    }

    pub async fn profile(&self, customer_id: &str) -> Result<Option<Profile>, LedgerError> {
        self.db.fetch_profile(customer_id).await
    }

    pub async fn entries(&self, customer_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db.entries_for_customer(customer_id).await
    }

    /// Compare the cached balances against a full ledger replay. The ledger is authoritative: a mismatch is a
    /// bug in cache maintenance, and is logged loudly here.
    pub async fn audit(&self, customer_id: &str) -> Result<BalanceAudit, LedgerError> {
        let cached = self.db.fetch_balances(customer_id).await?;
        let replayed = self.db.replay_balances(customer_id).await?;
        let audit = BalanceAudit { customer_id: customer_id.to_string(), cached, replayed };
        if !audit.is_consistent() {
            error!(
                "🧾️ Balance cache for customer {customer_id} diverged from the ledger: cached {:?}, replayed {:?}",
                audit.cached, audit.replayed
            );
        }
        Ok(audit)
    }

    pub async fn set_tier(&self, customer_id: &str, tier: LoyaltyTier) -> Result<Profile, LedgerError> {
        let profile = self.db.set_tier(customer_id, tier).await?;
        info!("🧾️ Customer {customer_id} is now tier {tier}");
        Ok(profile)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
