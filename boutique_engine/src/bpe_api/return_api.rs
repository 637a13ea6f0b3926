use boutique_common::Eur;
use chrono::{Duration, Utc};
use log::*;
use rand::Rng;

use crate::{
    bpe_api::{
        errors::ReturnFlowError,
        return_objects::{DeclareReturn, ReturnItemRequest, ReturnWithItems},
    },
    db_types::{LedgerEntry, NewReturnItem, NewReturnRequest, ReturnRequest, ReturnStatus},
    helpers::{calculate_refund, RefundInputs},
    traits::{LedgerManagement, PackageManagement, ReturnError, ReturnManagement},
};

/// `ReturnApi` drives the return lifecycle: declaring (which computes and freezes all amounts), the staff
/// progression `received → validated → completed`, and cancellation. Only completion touches the ledger.
pub struct ReturnApi<B> {
    db: B,
    /// How long after delivery an order stays return-eligible.
    return_window: Duration,
    /// The order-total threshold above which the promotional gift was granted.
    gift_threshold: Eur,
}

impl<B> ReturnApi<B> {
    pub fn new(db: B, return_window: Duration, gift_threshold: Eur) -> Self {
        Self { db, return_window, gift_threshold }
    }
}

impl<B> ReturnApi<B>
where B: ReturnManagement + PackageManagement + LedgerManagement
{
    /// Declare a return. Eligibility is evaluated now, not cached: the order must exist, belong to the customer,
    /// be delivered, and still be inside the return window. Every item amount is computed by the refund
    /// calculator and frozen; later status changes never recompute.
    pub async fn declare_return(&self, declare: DeclareReturn) -> Result<ReturnWithItems, ReturnFlowError> {
        validate_items(&declare.items)?;
        let now = Utc::now();
        let order = self
            .db
            .fetch_order(&declare.order_id)
            .await?
            .filter(|o| o.customer_id == declare.customer_id)
            .ok_or_else(|| ReturnError::OrderNotFound(declare.order_id.clone()))?;
        let delivered_at =
            order.delivered_at.ok_or_else(|| ReturnError::NotDelivered(order.order_id.clone()))?;
        if now > delivered_at + self.return_window {
            return Err(ReturnError::WindowExpired {
                order_id: order.order_id.clone(),
                days: self.return_window.num_days(),
            }
            .into());
        }

        let loyalty_earned = self.db.earned_on_order(&order.order_id).await?;
        let gift_already_returned = self.db.gift_already_returned(&order.order_id).await?;
        let prior_returned = self.db.returned_gross_for_order(&order.order_id).await?;
        let request_gross: Eur = declare.items.iter().map(|i| i.unit_price * i.quantity).sum();
        if prior_returned + request_gross > order.total_price {
            return Err(ReturnError::ValidationError(format!(
                "Returned value would exceed the order total ({} already returned of {})",
                prior_returned, order.total_price
            ))
            .into());
        }
        let order_total_after_removal = order.total_price - prior_returned - request_gross;

        let mut items = Vec::with_capacity(declare.items.len());
        let mut total_amount = Eur::default();
        let mut loyalty_recovered = Eur::default();
        let mut gift_deduction = Eur::default();
        let mut final_refund = Eur::default();
        for (idx, item) in declare.items.iter().enumerate() {
            let gross = item.unit_price * item.quantity;
            // The gift can only be clawed back once per request, so its inputs ride on the first item.
            let breakdown = calculate_refund(&RefundInputs {
                order_total: order.total_price,
                item_price: gross,
                order_discount: order.discount_total,
                loyalty_earned,
                had_promotional_gift: idx == 0 && order.has_gift,
                gift_value: order.gift_value,
                gift_threshold: self.gift_threshold,
                order_total_after_removal,
                gift_already_returned,
            });
            total_amount = total_amount + breakdown.net_price;
            loyalty_recovered = loyalty_recovered + breakdown.loyalty_to_recover;
            gift_deduction = gift_deduction + breakdown.gift_deduction;
            final_refund = final_refund + breakdown.final_refund;
            items.push(NewReturnItem {
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                product_slug: item.product_slug.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                discount_share: breakdown.discount_prorata,
                net_amount: breakdown.net_price,
                variation: item.variation.as_ref().map(|v| v.to_string()),
                image_url: item.image_url.clone(),
            });
        }
        // The clawback can never exceed what the order actually earned.
        loyalty_recovered = loyalty_recovered.min(loyalty_earned).max(Eur::default());

        let request = NewReturnRequest {
            return_number: new_return_number(),
            customer_id: declare.customer_id,
            order_id: order.order_id.clone(),
            return_type: declare.return_type,
            total_amount,
            loyalty_recovered,
            gift_deduction,
            claw_back_gift: !gift_deduction.is_zero(),
            final_refund,
            items,
        };
        let inserted = self.db.insert_return(request, now).await?;
        info!(
            "🔁️ Return {} declared against order {} ({} refundable)",
            inserted.return_number, inserted.order_id, inserted.final_refund
        );
        let items = self.db.fetch_return_items(inserted.id).await?;
        Ok(ReturnWithItems { request: inserted, items })
    }

    /// Staff progression to `Received` or `Validated`. Amounts stay frozen.
    pub async fn advance_return(&self, id: i64, new_status: ReturnStatus) -> Result<ReturnRequest, ReturnFlowError> {
        let updated = self.db.advance_return(id, new_status, Utc::now()).await?;
        debug!("🔁️ Return {} is now {}", updated.return_number, updated.status);
        Ok(updated)
    }

    /// Complete a validated return. This is the only transition that posts to the ledger: the loyalty clawback
    /// and, for credit returns, the wallet credit, atomically with the status flip.
    pub async fn complete_return(&self, id: i64) -> Result<(ReturnRequest, Vec<LedgerEntry>), ReturnFlowError> {
        let (completed, posted) = self.db.complete_return(id, Utc::now()).await?;
        info!("🔁️ Return {} completed; {} ledger posting(s)", completed.return_number, posted.len());
        Ok((completed, posted))
    }

    /// Cancel a return from any pre-completed state. Nothing is posted.
    pub async fn cancel_return(&self, id: i64) -> Result<ReturnRequest, ReturnFlowError> {
        let cancelled = self.db.cancel_return(id, Utc::now()).await?;
        info!("🔁️ Return {} cancelled", cancelled.return_number);
        Ok(cancelled)
    }

    pub async fn fetch_return(&self, id: i64) -> Result<ReturnWithItems, ReturnFlowError> {
        let request = self.db.fetch_return(id).await?.ok_or(ReturnError::ReturnNotFound(id))?;
        let items = self.db.fetch_return_items(id).await?;
        Ok(ReturnWithItems { request, items })
    }

    pub async fn returns_for_customer(&self, customer_id: &str) -> Result<Vec<ReturnRequest>, ReturnFlowError> {
        Ok(self.db.returns_for_customer(customer_id).await?)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

fn validate_items(items: &[ReturnItemRequest]) -> Result<(), ReturnError> {
    if items.is_empty() {
        return Err(ReturnError::ValidationError("A return must contain at least one item".to_string()));
    }
    for item in items {
        if item.quantity <= 0 {
            return Err(ReturnError::ValidationError(format!(
                "Quantity for product {} must be positive",
                item.product_id
            )));
        }
        if item.unit_price.is_negative() {
            return Err(ReturnError::ValidationError(format!(
                "Unit price for product {} must not be negative",
                item.product_id
            )));
        }
    }
    Ok(())
}

/// Human-readable return number, e.g. `RET-4F2A91C3`. Uniqueness is backstopped by the database constraint.
fn new_return_number() -> String {
    let n: u32 = rand::thread_rng().gen();
    format!("RET-{n:08X}")
}
