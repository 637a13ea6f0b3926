use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{CouponType, NewCoupon, NewCouponType, OrderId, UserCoupon},
    traits::{CouponError, CouponManagement},
};

/// `CouponApi` issues one-time-use coupons for qualifying events and consumes them at checkout.
#[derive(Debug, Clone)]
pub struct CouponApi<B> {
    db: B,
}

impl<B> CouponApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CouponApi<B>
where B: CouponManagement
{
    pub async fn create_coupon_type(&self, coupon_type: NewCouponType) -> Result<CouponType, CouponError> {
        if coupon_type.value.is_negative() || coupon_type.value.is_zero() {
            return Err(CouponError::ValidationError("A coupon type needs a positive value".to_string()));
        }
        if coupon_type.validity_days <= 0 {
            return Err(CouponError::ValidationError("validity_days must be positive".to_string()));
        }
        self.db.insert_coupon_type(coupon_type).await
    }

    /// Issue a coupon for a triggering event. The validity window starts now and runs for the coupon type's
    /// validity period; the same event can never pay out twice.
    pub async fn issue_coupon(&self, coupon: NewCoupon) -> Result<UserCoupon, CouponError> {
        if coupon.event_key.trim().is_empty() {
            return Err(CouponError::ValidationError("event_key must identify the triggering event".to_string()));
        }
        let coupon_type = self
            .db
            .fetch_coupon_type(coupon.coupon_type_id)
            .await?
            .ok_or(CouponError::CouponTypeNotFound(coupon.coupon_type_id))?;
        let valid_until = Utc::now() + Duration::days(coupon_type.validity_days);
        let issued = self.db.insert_coupon(coupon, valid_until).await?;
        info!("🎟️ Coupon #{} ({}) issued to customer {}", issued.id, coupon_type.name, issued.customer_id);
        Ok(issued)
    }

    /// Consume a coupon for an order. Atomic with respect to concurrent checkouts: at most one order ever holds
    /// the coupon.
    pub async fn redeem_coupon(&self, coupon_id: i64, order_id: &OrderId) -> Result<UserCoupon, CouponError> {
        let redeemed = self.db.redeem_coupon(coupon_id, order_id, Utc::now()).await?;
        info!("🎟️ Coupon #{coupon_id} redeemed on order {order_id}");
        Ok(redeemed)
    }

    pub async fn coupons_for_customer(
        &self,
        customer_id: &str,
        unused_only: bool,
    ) -> Result<Vec<UserCoupon>, CouponError> {
        self.db.coupons_for_customer(customer_id, unused_only).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
