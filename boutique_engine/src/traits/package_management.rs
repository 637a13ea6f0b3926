use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::db_types::{NewOpenPackage, NewOrder, OpenPackage, Order, OrderId, PackageOrder, PackageStatus};

/// Storage contract for the open-package state machine and the order projection it depends on.
///
/// Implementations enforce the two structural invariants at the storage layer, not in process memory, because the
/// application runs as multiple stateless instances:
/// * at most one `Active` package per customer (atomic check-and-insert);
/// * an order belongs to at most one package, ever (unique join row).
#[allow(async_fn_in_trait)]
pub trait PackageManagement {
    /// Atomically create a new `Active` package for the customer.
    ///
    /// `closes_at` is fixed here, at `now + window`, and is never extended afterwards. If the customer already has
    /// an active package the call fails with [`PackageError::ActivePackageExists`], even under concurrent
    /// attempts.
    async fn insert_package(
        &self,
        package: NewOpenPackage,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<OpenPackage, PackageError>;

    async fn fetch_package(&self, id: i64) -> Result<Option<OpenPackage>, PackageError>;

    /// The customer's active package, if any.
    ///
    /// Applies the lazy expiry check: a stored `Active` row whose deadline has passed is closed in place and `None`
    /// is returned, so readers never observe a package that is only nominally open.
    async fn fetch_active_package(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OpenPackage>, PackageError>;

    /// Attach an order to an active package and add the order's estimated weight to the running gauge.
    ///
    /// The package's closing deadline is not altered. If the deadline has already passed, the package is closed
    /// first and the call fails with [`PackageError::PackageNotActive`].
    async fn add_order_to_package(
        &self,
        package_id: i64,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<PackageOrder, PackageError>;

    /// Flip the paid flag on a package order. Returns the row and whether this call flipped it (`false` on
    /// webhook redelivery). The flag only ever moves false→true.
    async fn mark_order_paid(
        &self,
        package_order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(PackageOrder, bool), PackageError>;

    /// Transition `Active → Closed`. Idempotent: closing an already closed (or shipped) package is a no-op that
    /// returns the row unchanged and `false` in the second element.
    async fn close_package(&self, package_id: i64, now: DateTime<Utc>) -> Result<(OpenPackage, bool), PackageError>;

    /// Close every active package whose deadline has passed. Returns the packages closed by this call; safe to run
    /// concurrently with lazy closure on the read path.
    async fn close_expired_packages(&self, now: DateTime<Utc>) -> Result<Vec<OpenPackage>, PackageError>;

    /// Find active packages closing within `horizon` that have not been reminded yet, marking them reminded.
    /// Each package is returned by exactly one call, so the warning mail is sent once.
    async fn take_packages_closing_soon(
        &self,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OpenPackage>, PackageError>;

    /// Transition `Closed → Shipped`, setting the immutable final weight and tracking number.
    ///
    /// Fails with [`PackageError::PackageNotClosed`] on an `Active` or already `Shipped` package.
    async fn attach_shipment(
        &self,
        package_id: i64,
        tracking_number: &str,
        final_weight_g: i64,
        now: DateTime<Utc>,
    ) -> Result<OpenPackage, PackageError>;

    /// Record (or re-record, idempotently) the engine's projection of a storefront order. Returns the row and
    /// whether it was inserted by this call.
    async fn upsert_order(&self, order: NewOrder) -> Result<(Order, bool), PackageError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PackageError>;

    /// Stamp the delivery time on an order. Return eligibility is measured from this timestamp.
    async fn mark_order_delivered(&self, order_id: &OrderId, when: DateTime<Utc>) -> Result<Order, PackageError>;

    async fn fetch_package_orders(&self, package_id: i64) -> Result<Vec<PackageOrder>, PackageError>;

    async fn fetch_package_order(&self, package_order_id: i64) -> Result<Option<PackageOrder>, PackageError>;

    /// The package an order was shipped in, if the order ever joined one.
    async fn fetch_package_for_order(&self, order_id: &OrderId) -> Result<Option<OpenPackage>, PackageError>;
}

#[derive(Debug, Clone, Error)]
pub enum PackageError {
    #[error("We have an internal database error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Customer {0} already has an active package")]
    ActivePackageExists(String),
    #[error("The requested package {0} does not exist")]
    PackageNotFound(i64),
    #[error("The requested package order {0} does not exist")]
    PackageOrderNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} is already part of a package")]
    OrderAlreadyPackaged(OrderId),
    #[error("Package {id} is {status} and no longer accepts orders")]
    PackageNotActive { id: i64, status: PackageStatus },
    #[error("Package {id} is {status}; a shipment can only be attached to a closed package")]
    PackageNotClosed { id: i64, status: PackageStatus },
    #[error("{0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for PackageError {
    fn from(e: sqlx::Error) -> Self {
        PackageError::DatabaseError(e.to_string())
    }
}
