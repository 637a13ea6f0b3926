use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{LedgerEntry, NewReturnRequest, OrderId, ReturnItem, ReturnRequest, ReturnStatus},
    traits::LedgerError,
};

/// Storage contract for customer returns.
///
/// A return's amounts are computed once, at declaration, and frozen; the status lifecycle
/// (`Declared → Received → Validated → Completed`, `Cancelled` from any pre-completed state) never recomputes
/// them. Only completion posts to the ledger, and it does so in the same transaction as the status flip.
#[allow(async_fn_in_trait)]
pub trait ReturnManagement {
    /// Persist a fully computed return with its frozen items.
    async fn insert_return(&self, request: NewReturnRequest, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError>;

    async fn fetch_return(&self, id: i64) -> Result<Option<ReturnRequest>, ReturnError>;

    async fn fetch_return_by_number(&self, return_number: &str) -> Result<Option<ReturnRequest>, ReturnError>;

    async fn fetch_return_items(&self, return_id: i64) -> Result<Vec<ReturnItem>, ReturnError>;

    async fn returns_for_customer(&self, customer_id: &str) -> Result<Vec<ReturnRequest>, ReturnError>;

    /// Advance a return to `Received` or `Validated`, stamping the transition time. One-directional; an illegal
    /// step fails with [`ReturnError::InvalidTransition`].
    async fn advance_return(
        &self,
        id: i64,
        new_status: ReturnStatus,
        now: DateTime<Utc>,
    ) -> Result<ReturnRequest, ReturnError>;

    /// Complete a `Validated` return and post its ledger movements atomically: the loyalty clawback (clamped to
    /// what the order still has on the books and to the current balance) and, for credit-type returns, the wallet
    /// credit of the final refund. Returns the entries posted.
    async fn complete_return(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(ReturnRequest, Vec<LedgerEntry>), ReturnError>;

    /// Cancel a return from any pre-completed state. Posts nothing.
    async fn cancel_return(&self, id: i64, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError>;

    /// Whether a non-cancelled return against this order has already clawed the promotional gift back.
    async fn gift_already_returned(&self, order_id: &OrderId) -> Result<bool, ReturnError>;

    /// Gross value (unit price x quantity) of all items in non-cancelled returns against this order. Used to
    /// compute the order total after removal for subsequent returns.
    async fn returned_gross_for_order(&self, order_id: &OrderId) -> Result<boutique_common::Eur, ReturnError>;
}

#[derive(Debug, Clone, Error)]
pub enum ReturnError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested return {0} does not exist")]
    ReturnNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} has not been delivered, so it cannot be returned yet")]
    NotDelivered(OrderId),
    #[error("The return window for order {order_id} closed {days} days after delivery")]
    WindowExpired { order_id: OrderId, days: i64 },
    #[error("A return cannot move from {from} to {to}")]
    InvalidTransition { from: ReturnStatus, to: ReturnStatus },
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
}

impl From<sqlx::Error> for ReturnError {
    fn from(e: sqlx::Error) -> Self {
        ReturnError::DatabaseError(e.to_string())
    }
}
