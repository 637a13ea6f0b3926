//! Request and response bodies for the HTTP API. Monetary amounts travel as integer euro cents in a single
//! currency (EUR).
use boutique_common::Eur;
use boutique_engine::db_types::{CouponSource, LedgerEntryType, LoyaltyTier, OrderId, ReturnStatus, ReturnType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }
}

//----------------------------------------   Auth   ----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub customer_id: String,
    /// `customer` or `staff`.
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

//----------------------------------------   Packages   ------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OpenPackageRequest {
    pub shipping_method_id: i64,
    pub address_id: i64,
    #[serde(default)]
    pub shipping_cost_paid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddOrderRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentRequest {
    pub tracking_number: String,
    pub final_weight_g: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordOrderRequest {
    pub order_id: OrderId,
    pub customer_id: String,
    pub total_price: Eur,
    #[serde(default)]
    pub discount_total: Eur,
    #[serde(default)]
    pub estimated_weight_g: i64,
    #[serde(default)]
    pub has_gift: bool,
    #[serde(default)]
    pub gift_value: Eur,
}

//----------------------------------------   Payment webhook   -----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub package_order_id: i64,
    /// Processor-side event id, logged for traceability.
    pub event_id: Option<String>,
}

//----------------------------------------   Returns   -------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DeclareReturnRequest {
    pub order_id: OrderId,
    pub return_type: ReturnType,
    pub items: Vec<boutique_engine::return_objects::ReturnItemRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceReturnRequest {
    pub status: ReturnStatus,
}

//----------------------------------------   Ledger   --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PostLedgerRequest {
    pub customer_id: String,
    pub entry_type: LedgerEntryType,
    pub amount: Eur,
    pub description: String,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTierRequest {
    pub tier: LoyaltyTier,
}

//----------------------------------------   Coupons   -------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCouponTypeRequest {
    pub name: String,
    pub value: Eur,
    pub validity_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueCouponRequest {
    pub customer_id: String,
    pub coupon_type_id: i64,
    pub source: CouponSource,
    pub event_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemCouponRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponQuery {
    #[serde(default)]
    pub unused_only: bool,
}
