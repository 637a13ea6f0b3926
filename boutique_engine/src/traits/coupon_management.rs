use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{CouponType, NewCoupon, NewCouponType, OrderId, UserCoupon};

/// Storage contract for one-time-use coupons.
///
/// Issuance is unique per `(customer, coupon type, source, event key)` so a triggering event can never pay out
/// twice. Redemption is a conditional update bound to the consuming order: under concurrent checkouts exactly one
/// succeeds.
#[allow(async_fn_in_trait)]
pub trait CouponManagement {
    async fn insert_coupon_type(&self, coupon_type: NewCouponType) -> Result<CouponType, CouponError>;

    async fn fetch_coupon_type(&self, id: i64) -> Result<Option<CouponType>, CouponError>;

    /// Issue a coupon to a customer. `valid_until` has already been computed from the coupon type's validity
    /// period. A duplicate issuance for the same triggering event fails with [`CouponError::DuplicateIssue`].
    async fn insert_coupon(&self, coupon: NewCoupon, valid_until: DateTime<Utc>) -> Result<UserCoupon, CouponError>;

    async fn fetch_coupon(&self, id: i64) -> Result<Option<UserCoupon>, CouponError>;

    /// Consume a coupon for an order, atomically: the update only applies while the coupon is unused and within
    /// its validity window. Losing racers observe [`CouponError::AlreadyUsed`].
    async fn redeem_coupon(
        &self,
        coupon_id: i64,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<UserCoupon, CouponError>;

    async fn coupons_for_customer(&self, customer_id: &str, unused_only: bool) -> Result<Vec<UserCoupon>, CouponError>;
}

#[derive(Debug, Clone, Error)]
pub enum CouponError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested coupon type {0} does not exist")]
    CouponTypeNotFound(i64),
    #[error("The requested coupon {0} does not exist")]
    CouponNotFound(i64),
    #[error("Customer {customer_id} already holds a coupon of type {coupon_type_id} for this event")]
    DuplicateIssue { customer_id: String, coupon_type_id: i64 },
    #[error("Coupon {0} has already been used")]
    AlreadyUsed(i64),
    #[error("Coupon {0} has expired")]
    Expired(i64),
    #[error("{0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for CouponError {
    fn from(e: sqlx::Error) -> Self {
        CouponError::DatabaseError(e.to_string())
    }
}
