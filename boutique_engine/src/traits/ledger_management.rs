use boutique_common::Eur;
use thiserror::Error;

use crate::{
    db_types::{LedgerEntry, LedgerEntryType, LoyaltyTier, NewLedgerEntry, OrderId, Profile},
    traits::data_objects::Balances,
};

/// Storage contract for the append-only loyalty/wallet ledger.
///
/// Entries are immutable once posted; corrections are new offsetting entries. Each posting updates the cached
/// profile balances in the same transaction, and the cache must always equal a full replay of the ledger.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    /// Append one entry and update the cached balance it settles against.
    ///
    /// Gain entries (see [`LedgerEntryType::is_gain`]) have the customer's current tier multiplier applied at
    /// posting time; the multiplier is captured on the row so history survives tier changes. A debit that would
    /// push the bucket balance negative is rejected with [`LedgerError::InsufficientBalance`] — callers pre-clamp
    /// clawbacks, this is the defensive re-validation.
    ///
    /// Cashback is posted at most once per order: a second `OrderCashback` entry for the same order id fails
    /// with [`LedgerError::DuplicatePosting`]. Clawbacks and credits may recur per order, since one order can be
    /// returned in several parts.
    async fn post_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError>;

    /// Idempotent variant of [`post_entry`][Self::post_entry] for webhook-driven postings: a duplicate posting
    /// returns `Ok(None)` instead of an error.
    async fn post_entry_once(&self, entry: NewLedgerEntry) -> Result<Option<LedgerEntry>, LedgerError>;

    /// The cached balances for a customer. Missing profiles read as zero balances.
    async fn fetch_balances(&self, customer_id: &str) -> Result<Balances, LedgerError>;

    async fn fetch_profile(&self, customer_id: &str) -> Result<Option<Profile>, LedgerError>;

    /// All ledger entries for a customer, oldest first.
    async fn entries_for_customer(&self, customer_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Recompute the balances by summing every ledger entry. The audit path: must equal
    /// [`fetch_balances`][Self::fetch_balances].
    async fn replay_balances(&self, customer_id: &str) -> Result<Balances, LedgerError>;

    /// Net loyalty gains posted against a specific order (cashback minus any prior clawbacks). The cap for
    /// return clawbacks.
    async fn earned_on_order(&self, order_id: &OrderId) -> Result<Eur, LedgerError>;

    /// Set the customer's loyalty tier, creating the profile if needed. Affects future postings only.
    async fn set_tier(&self, customer_id: &str, tier: LoyaltyTier) -> Result<Profile, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("An entry of type {entry_type} has already been posted for order {order_id}")]
    DuplicatePosting { order_id: OrderId, entry_type: LedgerEntryType },
    #[error("Posting {amount} would leave customer {customer_id} with a negative balance of {resulting}")]
    InsufficientBalance { customer_id: String, amount: Eur, resulting: Eur },
    #[error("{0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
