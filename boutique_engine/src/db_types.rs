//! Row types and closed enumerations shared by the backend traits, the SQLite implementation and the public API.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub use boutique_common::Eur;

//--------------------------------------       OrderId       ---------------------------------------------------------
/// The storefront-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    PackageStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// The aggregation window is open and orders may join the package.
    Active,
    /// The window has passed, or the customer closed the package. No more orders may join.
    Closed,
    /// A carrier label has been attached. Terminal.
    Shipped,
}

impl Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageStatus::Active => write!(f, "Active"),
            PackageStatus::Closed => write!(f, "Closed"),
            PackageStatus::Shipped => write!(f, "Shipped"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl FromStr for PackageStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Closed" => Ok(Self::Closed),
            "Shipped" => Ok(Self::Shipped),
            s => Err(ConversionError(format!("Invalid package status: {s}"))),
        }
    }
}

impl From<String> for PackageStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid package status: {value}. But this conversion cannot fail. Defaulting to Closed");
            PackageStatus::Closed
        })
    }
}

//--------------------------------------     OpenPackage     ---------------------------------------------------------
/// One aggregation window for one customer. At most one `Active` package exists per customer at any time; the
/// database enforces this with a partial unique index.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OpenPackage {
    pub id: i64,
    pub customer_id: String,
    pub status: PackageStatus,
    pub opened_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub shipping_cost_paid: bool,
    pub shipping_method_id: i64,
    pub address_id: i64,
    /// Estimated weight of the package contents, in grams. Advisory only.
    pub virtual_weight_g: i64,
    /// Measured weight at shipment. Null until the package is shipped.
    pub final_weight_g: Option<i64>,
    /// Carrier tracking number. Null until the package is shipped.
    pub tracking_number: Option<String>,
    /// Set once the closing-soon warning mail has been queued for this package.
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpenPackage {
    /// True once the closing deadline has passed, regardless of what the persisted status row says.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        crate::helpers::is_closed(self.closes_at, now)
    }

    /// The status a reader must act on: a stale `Active` row whose deadline has passed reads as `Closed`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PackageStatus {
        if self.status == PackageStatus::Active && self.is_past_deadline(now) {
            PackageStatus::Closed
        } else {
            self.status
        }
    }
}

//--------------------------------------   NewOpenPackage    ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOpenPackage {
    pub customer_id: String,
    pub shipping_cost_paid: bool,
    pub shipping_method_id: i64,
    pub address_id: i64,
}

impl NewOpenPackage {
    pub fn new(customer_id: impl Into<String>, shipping_method_id: i64, address_id: i64) -> Self {
        Self { customer_id: customer_id.into(), shipping_cost_paid: false, shipping_method_id, address_id }
    }

    pub fn with_shipping_cost_paid(mut self) -> Self {
        self.shipping_cost_paid = true;
        self
    }
}

//--------------------------------------    PackageOrder     ---------------------------------------------------------
/// One order's membership in one package. Append-only; `is_paid` flips exactly once.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PackageOrder {
    pub id: i64,
    pub package_id: i64,
    pub order_id: OrderId,
    pub added_at: DateTime<Utc>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

//--------------------------------------        Order        ---------------------------------------------------------
/// The projection of a storefront order that the engine needs: totals for refund arithmetic, the estimated weight
/// for the package gauge, and the promotional-gift flags for clawback decisions.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub total_price: Eur,
    pub discount_total: Eur,
    pub estimated_weight_g: i64,
    pub has_gift: bool,
    pub gift_value: Eur,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub total_price: Eur,
    pub discount_total: Eur,
    pub estimated_weight_g: i64,
    pub has_gift: bool,
    pub gift_value: Eur,
}

impl NewOrder {
    pub fn new(order_id: OrderId, customer_id: impl Into<String>, total_price: Eur) -> Self {
        Self {
            order_id,
            customer_id: customer_id.into(),
            total_price,
            discount_total: Eur::default(),
            estimated_weight_g: 0,
            has_gift: false,
            gift_value: Eur::default(),
        }
    }

    pub fn with_discount(mut self, discount: Eur) -> Self {
        self.discount_total = discount;
        self
    }

    pub fn with_weight(mut self, grams: i64) -> Self {
        self.estimated_weight_g = grams;
        self
    }

    pub fn with_gift(mut self, value: Eur) -> Self {
        self.has_gift = true;
        self.gift_value = value;
        self
    }
}

//--------------------------------------    LoyaltyTier      ---------------------------------------------------------
/// Loyalty tier of a customer. Gain entries capture the tier multiplier in force at posting time, so later tier
/// changes never rewrite history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl LoyaltyTier {
    /// The cashback multiplier for this tier, in basis points (10_000 = x1.0).
    pub fn multiplier_bps(&self) -> i64 {
        match self {
            LoyaltyTier::Bronze => 10_000,
            LoyaltyTier::Silver => 11_000,
            LoyaltyTier::Gold => 12_500,
            LoyaltyTier::Diamond => 15_000,
        }
    }
}

impl Display for LoyaltyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoyaltyTier::Bronze => write!(f, "Bronze"),
            LoyaltyTier::Silver => write!(f, "Silver"),
            LoyaltyTier::Gold => write!(f, "Gold"),
            LoyaltyTier::Diamond => write!(f, "Diamond"),
        }
    }
}

impl FromStr for LoyaltyTier {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bronze" => Ok(Self::Bronze),
            "Silver" => Ok(Self::Silver),
            "Gold" => Ok(Self::Gold),
            "Diamond" => Ok(Self::Diamond),
            s => Err(ConversionError(format!("Invalid loyalty tier: {s}"))),
        }
    }
}

impl Default for LoyaltyTier {
    fn default() -> Self {
        Self::Bronze
    }
}

//--------------------------------------   LedgerEntryType   ---------------------------------------------------------
/// The closed set of ledger entry kinds. Adding a variant forces every match site to be revisited, which is the
/// point: the source system tagged these with free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Cashback earned when an order in a package is paid.
    OrderCashback,
    /// Reward for a published product review.
    Review,
    /// Reward for finding a hidden "diamond" in the boutique game.
    DiamondFound,
    /// Reward for a successful referral.
    Referral,
    /// Reversal of loyalty earned on a returned order.
    ReturnClawback,
    /// Wallet credit issued when a credit-type return completes.
    ReturnCredit,
    /// Manual staff correction, signed.
    Adjustment,
}

/// Which cached balance an entry settles against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceBucket {
    Wallet,
    Loyalty,
}

impl LedgerEntryType {
    pub fn bucket(&self) -> BalanceBucket {
        match self {
            LedgerEntryType::ReturnCredit | LedgerEntryType::Adjustment => BalanceBucket::Wallet,
            LedgerEntryType::OrderCashback
            | LedgerEntryType::Review
            | LedgerEntryType::DiamondFound
            | LedgerEntryType::Referral
            | LedgerEntryType::ReturnClawback => BalanceBucket::Loyalty,
        }
    }

    /// Gain entries have the tier multiplier applied at posting time.
    pub fn is_gain(&self) -> bool {
        matches!(
            self,
            LedgerEntryType::OrderCashback
                | LedgerEntryType::Review
                | LedgerEntryType::DiamondFound
                | LedgerEntryType::Referral
        )
    }
}

impl Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::OrderCashback => write!(f, "OrderCashback"),
            LedgerEntryType::Review => write!(f, "Review"),
            LedgerEntryType::DiamondFound => write!(f, "DiamondFound"),
            LedgerEntryType::Referral => write!(f, "Referral"),
            LedgerEntryType::ReturnClawback => write!(f, "ReturnClawback"),
            LedgerEntryType::ReturnCredit => write!(f, "ReturnCredit"),
            LedgerEntryType::Adjustment => write!(f, "Adjustment"),
        }
    }
}

impl FromStr for LedgerEntryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OrderCashback" => Ok(Self::OrderCashback),
            "Review" => Ok(Self::Review),
            "DiamondFound" => Ok(Self::DiamondFound),
            "Referral" => Ok(Self::Referral),
            "ReturnClawback" => Ok(Self::ReturnClawback),
            "ReturnCredit" => Ok(Self::ReturnCredit),
            "Adjustment" => Ok(Self::Adjustment),
            s => Err(ConversionError(format!("Invalid ledger entry type: {s}"))),
        }
    }
}

//--------------------------------------     LedgerEntry     ---------------------------------------------------------
/// One atomic, immutable change to a customer balance. Corrections are new offsetting entries, never edits.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub customer_id: String,
    pub entry_type: LedgerEntryType,
    /// Signed amount after the tier multiplier was applied.
    pub amount: Eur,
    pub description: String,
    /// Present when the entry is attributable to a specific order. Together with `entry_type` this forms the
    /// idempotency key for webhook-driven postings.
    pub order_id: Option<OrderId>,
    /// Tier multiplier captured at posting time, in basis points.
    pub multiplier_bps: i64,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   NewLedgerEntry    ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub customer_id: String,
    pub entry_type: LedgerEntryType,
    /// The base amount, before any tier multiplier.
    pub amount: Eur,
    pub description: String,
    pub order_id: Option<OrderId>,
}

impl NewLedgerEntry {
    pub fn new(customer_id: impl Into<String>, entry_type: LedgerEntryType, amount: Eur, description: impl Into<String>) -> Self {
        Self { customer_id: customer_id.into(), entry_type, amount, description: description.into(), order_id: None }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

//--------------------------------------       Profile       ---------------------------------------------------------
/// Cached balances for one customer. The ledger is authoritative; these columns are updated in the same transaction
/// as every posting and must always equal a full replay.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub customer_id: String,
    pub wallet_balance: Eur,
    pub loyalty_euros: Eur,
    pub tier: LoyaltyTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     ReturnType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    /// Refundable value is credited to the customer wallet.
    Credit,
    /// Refundable value is returned through the payment processor. No wallet posting.
    Refund,
}

impl Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnType::Credit => write!(f, "Credit"),
            ReturnType::Refund => write!(f, "Refund"),
        }
    }
}

impl FromStr for ReturnType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Credit" => Ok(Self::Credit),
            "Refund" => Ok(Self::Refund),
            s => Err(ConversionError(format!("Invalid return type: {s}"))),
        }
    }
}

//--------------------------------------    ReturnStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Declared,
    Received,
    Validated,
    Completed,
    Cancelled,
}

impl ReturnStatus {
    /// Whether a transition from `self` to `to` is allowed. Forward steps only; `Cancelled` is reachable from any
    /// state except `Completed`; both `Completed` and `Cancelled` are terminal.
    pub fn can_transition_to(&self, to: ReturnStatus) -> bool {
        use ReturnStatus::*;
        match (self, to) {
            (Declared, Received) | (Received, Validated) | (Validated, Completed) => true,
            (Declared | Received | Validated, Cancelled) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReturnStatus::Completed | ReturnStatus::Cancelled)
    }
}

impl Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnStatus::Declared => write!(f, "Declared"),
            ReturnStatus::Received => write!(f, "Received"),
            ReturnStatus::Validated => write!(f, "Validated"),
            ReturnStatus::Completed => write!(f, "Completed"),
            ReturnStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for ReturnStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Declared" => Ok(Self::Declared),
            "Received" => Ok(Self::Received),
            "Validated" => Ok(Self::Validated),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid return status: {s}"))),
        }
    }
}

//--------------------------------------    ReturnRequest    ---------------------------------------------------------
/// A customer return. All amounts are frozen at declaration time; status transitions never recompute them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: i64,
    pub return_number: String,
    pub customer_id: String,
    pub order_id: OrderId,
    pub return_type: ReturnType,
    pub status: ReturnStatus,
    /// Sum of the per-item net refundable amounts, before the gift deduction.
    pub total_amount: Eur,
    /// Loyalty to be clawed back at completion (pre-clamped to what the order earned).
    pub loyalty_recovered: Eur,
    /// Value of the promotional gift deducted from the refund, if clawed back.
    pub gift_deduction: Eur,
    /// True when the promotional gift must be returned or its value deducted.
    pub claw_back_gift: bool,
    /// The refund actually paid out at completion.
    pub final_refund: Eur,
    pub declared_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

//--------------------------------------     ReturnItem      ---------------------------------------------------------
/// One line of a return. `net_amount` is computed once at declaration and immutable afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReturnItem {
    pub id: i64,
    pub return_request_id: i64,
    pub product_id: String,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i64,
    pub unit_price: Eur,
    /// This line's share of the order-level discount.
    pub discount_share: Eur,
    /// `quantity * unit_price - discount_share`, floored at zero after deductions.
    pub net_amount: Eur,
    /// JSON snapshot of the chosen variation, if any.
    pub variation: Option<String>,
    pub image_url: Option<String>,
}

//--------------------------------------  NewReturnRequest   ---------------------------------------------------------
/// A fully computed return, ready for insertion. Produced by `ReturnApi::declare_return`; never built by callers
/// directly, since the amounts must come out of the refund calculator.
#[derive(Debug, Clone)]
pub struct NewReturnRequest {
    pub return_number: String,
    pub customer_id: String,
    pub order_id: OrderId,
    pub return_type: ReturnType,
    pub total_amount: Eur,
    pub loyalty_recovered: Eur,
    pub gift_deduction: Eur,
    pub claw_back_gift: bool,
    pub final_refund: Eur,
    pub items: Vec<NewReturnItem>,
}

#[derive(Debug, Clone)]
pub struct NewReturnItem {
    pub product_id: String,
    pub product_name: String,
    pub product_slug: String,
    pub quantity: i64,
    pub unit_price: Eur,
    pub discount_share: Eur,
    pub net_amount: Eur,
    pub variation: Option<String>,
    pub image_url: Option<String>,
}

//--------------------------------------    CouponSource     ---------------------------------------------------------
/// What triggered a coupon issuance. Together with the coupon type, customer and event key it forms the
/// one-payout-per-event uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponSource {
    Signup,
    GameWin,
    Referral,
    Cashback,
}

impl Display for CouponSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponSource::Signup => write!(f, "Signup"),
            CouponSource::GameWin => write!(f, "GameWin"),
            CouponSource::Referral => write!(f, "Referral"),
            CouponSource::Cashback => write!(f, "Cashback"),
        }
    }
}

impl FromStr for CouponSource {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Signup" => Ok(Self::Signup),
            "GameWin" => Ok(Self::GameWin),
            "Referral" => Ok(Self::Referral),
            "Cashback" => Ok(Self::Cashback),
            s => Err(ConversionError(format!("Invalid coupon source: {s}"))),
        }
    }
}

//--------------------------------------     CouponType      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CouponType {
    pub id: i64,
    pub name: String,
    pub value: Eur,
    /// Validity period of issued coupons, in days from issuance.
    pub validity_days: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCouponType {
    pub name: String,
    pub value: Eur,
    pub validity_days: i64,
}

//--------------------------------------     UserCoupon      ---------------------------------------------------------
/// A one-time-use coupon held by a customer. `is_used` flips exactly once, atomically with the consuming order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserCoupon {
    pub id: i64,
    pub customer_id: String,
    pub coupon_type_id: i64,
    pub source: CouponSource,
    /// Identifies the triggering event (e.g. a game play id), so the same event can never pay out twice.
    pub event_key: String,
    pub valid_until: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub used_on_order: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      NewCoupon      ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCoupon {
    pub customer_id: String,
    pub coupon_type_id: i64,
    pub source: CouponSource,
    pub event_key: String,
}

impl NewCoupon {
    pub fn new(customer_id: impl Into<String>, coupon_type_id: i64, source: CouponSource, event_key: impl Into<String>) -> Self {
        Self { customer_id: customer_id.into(), coupon_type_id, source, event_key: event_key.into() }
    }
}
