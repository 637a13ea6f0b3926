use std::fmt::Debug;

use boutique_common::Eur;
use chrono::{Duration, Utc};
use log::*;

use crate::{
    bpe_api::{
        errors::PackageFlowError,
        package_objects::{PackageSummary, WeightGauge},
    },
    db_types::{
        LedgerEntry,
        LedgerEntryType,
        NewLedgerEntry,
        NewOpenPackage,
        NewOrder,
        OpenPackage,
        Order,
        OrderId,
        PackageOrder,
    },
    events::{
        EventProducers,
        OrderAddedEvent,
        PackageClosedEvent,
        PackageClosingSoonEvent,
        PackageOpenedEvent,
        PackageShippedEvent,
    },
    helpers::countdown,
    traits::{LedgerManagement, PackageError, PackageManagement, SweepOutcome},
};

/// Tunables for the package flow, validated once at boot and injected here. There is no ambient configuration:
/// every instance carries its own copy.
#[derive(Debug, Clone, Copy)]
pub struct PackageFlowConfig {
    /// Length of the aggregation window. Fixed at open time; adding orders does not extend it.
    pub window: Duration,
    /// Display cap of the advisory weight gauge.
    pub weight_cap_g: i64,
    /// Cashback granted on each paid order, in basis points of the order total.
    pub cashback_rate_bps: i64,
}

impl Default for PackageFlowConfig {
    fn default() -> Self {
        Self { window: Duration::hours(72), weight_cap_g: 20_000, cashback_rate_bps: 200 }
    }
}

/// `PackageFlowApi` is the primary API for the open-package lifecycle: opening the window, attaching orders,
/// closing (manually, lazily or by sweep) and finalizing the shipment. Payment confirmations route through here
/// too, because marking an order paid is what triggers its cashback posting.
pub struct PackageFlowApi<B> {
    db: B,
    producers: EventProducers,
    config: PackageFlowConfig,
}

impl<B> Debug for PackageFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackageFlowApi")
    }
}

impl<B> PackageFlowApi<B> {
    pub fn new(db: B, producers: EventProducers, config: PackageFlowConfig) -> Self {
        Self { db, producers, config }
    }

    pub fn config(&self) -> &PackageFlowConfig {
        &self.config
    }
}

impl<B> PackageFlowApi<B>
where B: PackageManagement + LedgerManagement
{
    /// Open a new package for the customer. Fails if one is already active; the closing deadline is fixed here
    /// and never moves afterwards.
    pub async fn open_package(&self, package: NewOpenPackage) -> Result<OpenPackage, PackageFlowError> {
        if package.customer_id.trim().is_empty() {
            return Err(PackageError::ValidationError("customer_id must not be empty".to_string()).into());
        }
        if package.shipping_method_id <= 0 || package.address_id <= 0 {
            return Err(PackageError::ValidationError(
                "A package needs a shipping method and a delivery address".to_string(),
            )
            .into());
        }
        let opened = self.db.insert_package(package, self.config.window, Utc::now()).await?;
        debug!("🔄️📦️ Package #{} opened for customer {} until {}", opened.id, opened.customer_id, opened.closes_at);
        self.call_package_opened_hook(&opened).await;
        Ok(opened)
    }

    /// The customer's active package with live countdown and gauge, or `None`. A package whose deadline has
    /// passed is closed on this read and not returned.
    pub async fn active_package(&self, customer_id: &str) -> Result<Option<PackageSummary>, PackageFlowError> {
        let now = Utc::now();
        let package = self.db.fetch_active_package(customer_id, now).await?;
        match package {
            Some(p) => Ok(Some(self.summarize(p).await?)),
            None => Ok(None),
        }
    }

    pub async fn package_summary(&self, package_id: i64) -> Result<PackageSummary, PackageFlowError> {
        let package =
            self.db.fetch_package(package_id).await?.ok_or(PackageError::PackageNotFound(package_id))?;
        self.summarize(package).await
    }

    async fn summarize(&self, package: OpenPackage) -> Result<PackageSummary, PackageFlowError> {
        let orders = self.db.fetch_package_orders(package.id).await?;
        let gauge = WeightGauge::new(package.virtual_weight_g, self.config.weight_cap_g);
        let countdown = countdown(package.closes_at, Utc::now());
        Ok(PackageSummary { package, countdown, gauge, orders })
    }

    /// Attach an order to the package. The deadline is checked first (and enforced lazily), the order's estimated
    /// weight is added to the gauge, and the join row is created unpaid.
    pub async fn add_order(&self, package_id: i64, order_id: &OrderId) -> Result<PackageOrder, PackageFlowError> {
        let package_order = self.db.add_order_to_package(package_id, order_id, Utc::now()).await?;
        debug!("🔄️📦️ Order {order_id} added to package #{package_id}");
        if let Some(package) = self.db.fetch_package(package_id).await? {
            self.call_order_added_hook(&package, &package_order).await;
        }
        Ok(package_order)
    }

    /// Handle a payment confirmation for a package order.
    ///
    /// Safe under webhook redelivery: the paid flag flips at most once, and the cashback posting is keyed by
    /// `(order, OrderCashback)` in the ledger, so the customer is credited exactly once no matter how many times
    /// the processor retries. Returns the join row and the cashback entry if this call posted it.
    pub async fn confirm_order_paid(
        &self,
        package_order_id: i64,
    ) -> Result<(PackageOrder, Option<LedgerEntry>), PackageFlowError> {
        let (package_order, newly_paid) = self.db.mark_order_paid(package_order_id, Utc::now()).await?;
        if !newly_paid {
            trace!("🔄️💰️ Package order #{package_order_id} already paid; confirmation was redelivered");
        }
        let order = self
            .db
            .fetch_order(&package_order.order_id)
            .await?
            .ok_or_else(|| PackageError::OrderNotFound(package_order.order_id.clone()))?;
        let cashback = self.post_cashback(&order).await?;
        debug!(
            "🔄️💰️ Order {} confirmed paid. Cashback posted: {}",
            order.order_id,
            cashback.as_ref().map(|e| e.amount.to_string()).unwrap_or_else(|| "none".to_string())
        );
        Ok((package_order, cashback))
    }

    async fn post_cashback(&self, order: &Order) -> Result<Option<LedgerEntry>, PackageFlowError> {
        let base = Eur::from(order.total_price.value() * self.config.cashback_rate_bps / 10_000);
        if base.is_zero() || base.is_negative() {
            return Ok(None);
        }
        let entry = NewLedgerEntry::new(
            order.customer_id.clone(),
            LedgerEntryType::OrderCashback,
            base,
            format!("Cashback on order {}", order.order_id),
        )
        .for_order(order.order_id.clone());
        let posted = self.db.post_entry_once(entry).await?;
        Ok(posted)
    }

    /// Close the package now. Idempotent; fires the closed hook only on the actual transition.
    pub async fn close_package(&self, package_id: i64) -> Result<OpenPackage, PackageFlowError> {
        let (package, transitioned) = self.db.close_package(package_id, Utc::now()).await?;
        if transitioned {
            debug!("🔄️📦️ Package #{package_id} closed manually");
            self.call_package_closed_hook(&package).await;
        }
        Ok(package)
    }

    /// One pass of the time-driven sweep: close every package past its deadline, then flag packages entering the
    /// warning horizon so the closing-soon mail goes out once each.
    pub async fn sweep(&self, warning_horizon: Duration) -> Result<SweepOutcome, PackageFlowError> {
        let now = Utc::now();
        let closed = self.db.close_expired_packages(now).await?;
        for package in &closed {
            self.call_package_closed_hook(package).await;
        }
        let reminded = self.db.take_packages_closing_soon(warning_horizon, now).await?;
        for package in &reminded {
            self.call_closing_soon_hook(package).await;
        }
        Ok(SweepOutcome { closed, reminded })
    }

    /// Finalize the shipment of a closed package with its measured weight and tracking number.
    pub async fn attach_shipment(
        &self,
        package_id: i64,
        tracking_number: &str,
        final_weight_g: i64,
    ) -> Result<OpenPackage, PackageFlowError> {
        if tracking_number.trim().is_empty() {
            return Err(PackageError::ValidationError("tracking_number must not be empty".to_string()).into());
        }
        if final_weight_g <= 0 {
            return Err(PackageError::ValidationError("final_weight_g must be positive".to_string()).into());
        }
        let shipped = self.db.attach_shipment(package_id, tracking_number, final_weight_g, Utc::now()).await?;
        debug!("🔄️📦️ Package #{package_id} shipped ({final_weight_g} g, tracking {tracking_number})");
        self.call_package_shipped_hook(&shipped).await;
        Ok(shipped)
    }

    /// Project a storefront order into the engine. Idempotent under checkout-event replay.
    pub async fn record_order(&self, order: NewOrder) -> Result<(Order, bool), PackageFlowError> {
        if order.total_price.is_negative() {
            return Err(PackageError::ValidationError("total_price must not be negative".to_string()).into());
        }
        if order.discount_total.is_negative() || order.discount_total > order.total_price {
            return Err(PackageError::ValidationError(
                "discount_total must lie between zero and the order total".to_string(),
            )
            .into());
        }
        if order.estimated_weight_g < 0 {
            return Err(PackageError::ValidationError("estimated_weight_g must not be negative".to_string()).into());
        }
        Ok(self.db.upsert_order(order).await?)
    }

    pub async fn mark_order_delivered(&self, order_id: &OrderId) -> Result<Order, PackageFlowError> {
        Ok(self.db.mark_order_delivered(order_id, Utc::now()).await?)
    }

    pub async fn package_orders(&self, package_id: i64) -> Result<Vec<PackageOrder>, PackageFlowError> {
        Ok(self.db.fetch_package_orders(package_id).await?)
    }

    async fn call_package_opened_hook(&self, package: &OpenPackage) {
        for emitter in &self.producers.package_opened_producer {
            emitter.publish_event(PackageOpenedEvent::new(package.clone())).await;
        }
    }

    async fn call_order_added_hook(&self, package: &OpenPackage, package_order: &PackageOrder) {
        for emitter in &self.producers.order_added_producer {
            emitter.publish_event(OrderAddedEvent::new(package.clone(), package_order.clone())).await;
        }
    }

    async fn call_package_closed_hook(&self, package: &OpenPackage) {
        for emitter in &self.producers.package_closed_producer {
            emitter.publish_event(PackageClosedEvent::new(package.clone())).await;
        }
    }

    async fn call_package_shipped_hook(&self, package: &OpenPackage) {
        for emitter in &self.producers.package_shipped_producer {
            emitter.publish_event(PackageShippedEvent::new(package.clone())).await;
        }
    }

    async fn call_closing_soon_hook(&self, package: &OpenPackage) {
        for emitter in &self.producers.closing_soon_producer {
            emitter.publish_event(PackageClosingSoonEvent::new(package.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
