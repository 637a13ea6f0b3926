//! `SqliteDatabase` is a concrete implementation of a boutique engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Multi-statement flows run inside a single transaction; single-statement flows borrow a pool
//! connection directly.
use std::fmt::Debug;

use boutique_common::Eur;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::SqlitePool;

use super::db::{coupons, ledger, orders, packages, returns};
use crate::{
    db_types::{
        BalanceBucket,
        CouponType,
        LedgerEntry,
        LedgerEntryType,
        LoyaltyTier,
        NewCoupon,
        NewCouponType,
        NewLedgerEntry,
        NewOpenPackage,
        NewOrder,
        NewReturnRequest,
        OpenPackage,
        Order,
        OrderId,
        PackageOrder,
        Profile,
        ReturnItem,
        ReturnRequest,
        ReturnStatus,
        ReturnType,
        UserCoupon,
    },
    traits::{
        Balances,
        CouponError,
        CouponManagement,
        LedgerError,
        LedgerManagement,
        PackageError,
        PackageManagement,
        ReturnError,
        ReturnManagement,
        StorefrontDatabase,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = super::db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await
    }
}

impl PackageManagement for SqliteDatabase {
    async fn insert_package(
        &self,
        package: NewOpenPackage,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<OpenPackage, PackageError> {
        let mut conn = self.pool.acquire().await?;
        packages::insert_package(package, window, now, &mut conn).await
    }

    async fn fetch_package(&self, id: i64) -> Result<Option<OpenPackage>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(packages::fetch_package(id, &mut conn).await?)
    }

    async fn fetch_active_package(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OpenPackage>, PackageError> {
        let mut tx = self.pool.begin().await?;
        let package = packages::fetch_active_for_customer(customer_id, &mut tx).await?;
        let result = match package {
            Some(p) if p.is_past_deadline(now) => {
                // The deadline, not the stored status, is authoritative. Persist what it implies.
                let (closed, _) = packages::close_package(p.id, now, &mut tx).await?;
                debug!("🗃️ Package #{} had passed its deadline and was closed lazily on read", closed.id);
                None
            },
            other => other,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn add_order_to_package(
        &self,
        package_id: i64,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<PackageOrder, PackageError> {
        let mut tx = self.pool.begin().await?;
        let package =
            packages::fetch_package(package_id, &mut tx).await?.ok_or(PackageError::PackageNotFound(package_id))?;
        if let Err(e) = packages::ensure_accepting_orders(&package, now, &mut tx).await {
            // The lazy closure must survive the failed join attempt.
            tx.commit().await?;
            return Err(e);
        }
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| PackageError::OrderNotFound(order_id.clone()))?;
        if order.customer_id != package.customer_id {
            return Err(PackageError::ValidationError(format!(
                "Order {order_id} belongs to customer {}, not to the package owner {}",
                order.customer_id, package.customer_id
            )));
        }
        let package_order = packages::insert_package_order(package_id, order_id, now, &mut tx).await?;
        packages::add_weight(package_id, order.estimated_weight_g, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} joined package #{package_id}");
        Ok(package_order)
    }

    async fn mark_order_paid(
        &self,
        package_order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(PackageOrder, bool), PackageError> {
        let mut conn = self.pool.acquire().await?;
        packages::mark_order_paid(package_order_id, now, &mut conn).await
    }

    async fn close_package(&self, package_id: i64, now: DateTime<Utc>) -> Result<(OpenPackage, bool), PackageError> {
        let mut conn = self.pool.acquire().await?;
        packages::close_package(package_id, now, &mut conn).await
    }

    async fn close_expired_packages(&self, now: DateTime<Utc>) -> Result<Vec<OpenPackage>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        packages::close_expired(now, &mut conn).await
    }

    async fn take_packages_closing_soon(
        &self,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OpenPackage>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        packages::take_closing_soon(horizon, now, &mut conn).await
    }

    async fn attach_shipment(
        &self,
        package_id: i64,
        tracking_number: &str,
        final_weight_g: i64,
        now: DateTime<Utc>,
    ) -> Result<OpenPackage, PackageError> {
        let mut conn = self.pool.acquire().await?;
        packages::attach_shipment(package_id, tracking_number, final_weight_g, now, &mut conn).await
    }

    async fn upsert_order(&self, order: NewOrder) -> Result<(Order, bool), PackageError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_id(order_id, &mut conn).await?)
    }

    async fn mark_order_delivered(&self, order_id: &OrderId, when: DateTime<Utc>) -> Result<Order, PackageError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_delivered(order_id, when, &mut conn).await
    }

    async fn fetch_package_orders(&self, package_id: i64) -> Result<Vec<PackageOrder>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(packages::fetch_package_orders(package_id, &mut conn).await?)
    }

    async fn fetch_package_order(&self, package_order_id: i64) -> Result<Option<PackageOrder>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(packages::fetch_package_order(package_order_id, &mut conn).await?)
    }

    async fn fetch_package_for_order(&self, order_id: &OrderId) -> Result<Option<OpenPackage>, PackageError> {
        let mut conn = self.pool.acquire().await?;
        Ok(packages::fetch_package_for_order(order_id, &mut conn).await?)
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn post_entry(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let posted = ledger::post_entry(entry, &mut tx).await?;
        tx.commit().await?;
        Ok(posted)
    }

    async fn post_entry_once(&self, entry: NewLedgerEntry) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        match ledger::post_entry(entry, &mut tx).await {
            Ok(posted) => {
                tx.commit().await?;
                Ok(Some(posted))
            },
            Err(LedgerError::DuplicatePosting { order_id, entry_type }) => {
                debug!("🗃️ {entry_type} for order {order_id} was already posted; skipping");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    async fn fetch_balances(&self, customer_id: &str) -> Result<Balances, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let profile = ledger::fetch_profile(customer_id, &mut conn).await?;
        Ok(profile.map(|p| Balances { wallet: p.wallet_balance, loyalty: p.loyalty_euros }).unwrap_or_default())
    }

    async fn fetch_profile(&self, customer_id: &str) -> Result<Option<Profile>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::fetch_profile(customer_id, &mut conn).await?)
    }

    async fn entries_for_customer(&self, customer_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::entries_for_customer(customer_id, &mut conn).await?)
    }

    async fn replay_balances(&self, customer_id: &str) -> Result<Balances, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::entries_for_customer(customer_id, &mut conn).await?;
        let balances = entries.iter().fold(Balances::default(), |mut acc, e| {
            match e.entry_type.bucket() {
                BalanceBucket::Wallet => acc.wallet = acc.wallet + e.amount,
                BalanceBucket::Loyalty => acc.loyalty = acc.loyalty + e.amount,
            }
            acc
        });
        Ok(balances)
    }

    async fn earned_on_order(&self, order_id: &OrderId) -> Result<Eur, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::entries_for_order(order_id, &mut conn).await?;
        let earned = entries
            .iter()
            .filter(|e| e.entry_type.bucket() == BalanceBucket::Loyalty)
            .map(|e| e.amount)
            .sum();
        Ok(earned)
    }

    async fn set_tier(&self, customer_id: &str, tier: LoyaltyTier) -> Result<Profile, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let profile = ledger::set_tier(customer_id, tier, &mut tx).await?;
        tx.commit().await?;
        Ok(profile)
    }
}

impl ReturnManagement for SqliteDatabase {
    async fn insert_return(&self, request: NewReturnRequest, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError> {
        let mut tx = self.pool.begin().await?;
        let inserted = returns::insert_return(request, now, &mut tx).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn fetch_return(&self, id: i64) -> Result<Option<ReturnRequest>, ReturnError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::fetch_return(id, &mut conn).await?)
    }

    async fn fetch_return_by_number(&self, return_number: &str) -> Result<Option<ReturnRequest>, ReturnError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::fetch_return_by_number(return_number, &mut conn).await?)
    }

    async fn fetch_return_items(&self, return_id: i64) -> Result<Vec<ReturnItem>, ReturnError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::fetch_return_items(return_id, &mut conn).await?)
    }

    async fn returns_for_customer(&self, customer_id: &str) -> Result<Vec<ReturnRequest>, ReturnError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::returns_for_customer(customer_id, &mut conn).await?)
    }

    async fn advance_return(
        &self,
        id: i64,
        new_status: ReturnStatus,
        now: DateTime<Utc>,
    ) -> Result<ReturnRequest, ReturnError> {
        if !matches!(new_status, ReturnStatus::Received | ReturnStatus::Validated) {
            return Err(ReturnError::ValidationError(format!(
                "Returns move to {new_status} through the dedicated completion or cancellation flow"
            )));
        }
        let mut tx = self.pool.begin().await?;
        let current = returns::fetch_return(id, &mut tx).await?.ok_or(ReturnError::ReturnNotFound(id))?;
        if !current.status.can_transition_to(new_status) {
            return Err(ReturnError::InvalidTransition { from: current.status, to: new_status });
        }
        let updated = returns::update_status(id, current.status, new_status, now, &mut tx)
            .await?
            .ok_or(ReturnError::InvalidTransition { from: current.status, to: new_status })?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn complete_return(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<(ReturnRequest, Vec<LedgerEntry>), ReturnError> {
        let mut tx = self.pool.begin().await?;
        let current = returns::fetch_return(id, &mut tx).await?.ok_or(ReturnError::ReturnNotFound(id))?;
        if current.status != ReturnStatus::Validated {
            return Err(ReturnError::InvalidTransition { from: current.status, to: ReturnStatus::Completed });
        }
        let completed = returns::update_status(id, ReturnStatus::Validated, ReturnStatus::Completed, now, &mut tx)
            .await?
            .ok_or(ReturnError::InvalidTransition { from: current.status, to: ReturnStatus::Completed })?;
        let mut posted = Vec::new();
        // Clawback, re-clamped to what the order still has on the books and to the live balance. The calculator
        // pre-clamped at declaration time, but the books may have moved since.
        if completed.loyalty_recovered > Eur::default() {
            let earned: Eur = ledger::entries_for_order(&completed.order_id, &mut tx)
                .await
                .map_err(ReturnError::from)?
                .iter()
                .filter(|e| e.entry_type.bucket() == BalanceBucket::Loyalty)
                .map(|e| e.amount)
                .sum();
            let balance =
                ledger::fetch_or_create_profile(&completed.customer_id, &mut tx).await.map_err(ReturnError::from)?.loyalty_euros;
            let clawback = completed.loyalty_recovered.min(earned).min(balance).max(Eur::default());
            if clawback > Eur::default() {
                let entry = NewLedgerEntry::new(
                    completed.customer_id.clone(),
                    LedgerEntryType::ReturnClawback,
                    -clawback,
                    format!("Loyalty recovered on return {}", completed.return_number),
                )
                .for_order(completed.order_id.clone());
                posted.push(ledger::post_entry(entry, &mut tx).await.map_err(ReturnError::from)?);
            }
        }
        if completed.return_type == ReturnType::Credit && completed.final_refund > Eur::default() {
            let entry = NewLedgerEntry::new(
                completed.customer_id.clone(),
                LedgerEntryType::ReturnCredit,
                completed.final_refund,
                format!("Wallet credit for return {}", completed.return_number),
            )
            .for_order(completed.order_id.clone());
            posted.push(ledger::post_entry(entry, &mut tx).await.map_err(ReturnError::from)?);
        }
        tx.commit().await?;
        debug!("🗃️ Return {} completed with {} ledger posting(s)", completed.return_number, posted.len());
        Ok((completed, posted))
    }

    async fn cancel_return(&self, id: i64, now: DateTime<Utc>) -> Result<ReturnRequest, ReturnError> {
        let mut tx = self.pool.begin().await?;
        let current = returns::fetch_return(id, &mut tx).await?.ok_or(ReturnError::ReturnNotFound(id))?;
        if !current.status.can_transition_to(ReturnStatus::Cancelled) {
            return Err(ReturnError::InvalidTransition { from: current.status, to: ReturnStatus::Cancelled });
        }
        let cancelled = returns::update_status(id, current.status, ReturnStatus::Cancelled, now, &mut tx)
            .await?
            .ok_or(ReturnError::InvalidTransition { from: current.status, to: ReturnStatus::Cancelled })?;
        tx.commit().await?;
        Ok(cancelled)
    }

    async fn gift_already_returned(&self, order_id: &OrderId) -> Result<bool, ReturnError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::gift_already_returned(order_id, &mut conn).await?)
    }

    async fn returned_gross_for_order(&self, order_id: &OrderId) -> Result<Eur, ReturnError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::returned_gross_for_order(order_id, &mut conn).await?)
    }
}

impl CouponManagement for SqliteDatabase {
    async fn insert_coupon_type(&self, coupon_type: NewCouponType) -> Result<CouponType, CouponError> {
        let mut conn = self.pool.acquire().await?;
        coupons::insert_coupon_type(coupon_type, &mut conn).await
    }

    async fn fetch_coupon_type(&self, id: i64) -> Result<Option<CouponType>, CouponError> {
        let mut conn = self.pool.acquire().await?;
        Ok(coupons::fetch_coupon_type(id, &mut conn).await?)
    }

    async fn insert_coupon(&self, coupon: NewCoupon, valid_until: DateTime<Utc>) -> Result<UserCoupon, CouponError> {
        let mut conn = self.pool.acquire().await?;
        coupons::insert_coupon(coupon, valid_until, &mut conn).await
    }

    async fn fetch_coupon(&self, id: i64) -> Result<Option<UserCoupon>, CouponError> {
        let mut conn = self.pool.acquire().await?;
        Ok(coupons::fetch_coupon(id, &mut conn).await?)
    }

    async fn redeem_coupon(
        &self,
        coupon_id: i64,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<UserCoupon, CouponError> {
        let mut conn = self.pool.acquire().await?;
        coupons::redeem_coupon(coupon_id, order_id, now, &mut conn).await
    }

    async fn coupons_for_customer(&self, customer_id: &str, unused_only: bool) -> Result<Vec<UserCoupon>, CouponError> {
        let mut conn = self.pool.acquire().await?;
        Ok(coupons::coupons_for_customer(customer_id, unused_only, &mut conn).await?)
    }
}

impl StorefrontDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) {
        self.pool.close().await;
    }
}
