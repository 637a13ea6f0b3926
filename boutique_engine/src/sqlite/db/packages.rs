use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOpenPackage, OpenPackage, OrderId, PackageOrder, PackageStatus},
    sqlite::db::is_unique_violation,
    traits::PackageError,
};

/// Atomic check-and-insert of a new active package. The partial unique index on `(customer_id) WHERE
/// status = 'Active'` turns a concurrent second open into a constraint violation rather than a race.
pub async fn insert_package(
    package: NewOpenPackage,
    window: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OpenPackage, PackageError> {
    let closes_at = now + window;
    let result = sqlx::query_as(
        r#"
            INSERT INTO open_packages (
                customer_id,
                status,
                opened_at,
                closes_at,
                shipping_cost_paid,
                shipping_method_id,
                address_id
            ) VALUES ($1, 'Active', $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(package.customer_id.clone())
    .bind(now)
    .bind(closes_at)
    .bind(package.shipping_cost_paid)
    .bind(package.shipping_method_id)
    .bind(package.address_id)
    .fetch_one(conn)
    .await;
    match result {
        Ok(p) => {
            let p: OpenPackage = p;
            debug!("🗃️ Package #{} opened for customer {} until {}", p.id, p.customer_id, p.closes_at);
            Ok(p)
        },
        Err(e) if is_unique_violation(&e, "open_packages.customer_id") => {
            Err(PackageError::ActivePackageExists(package.customer_id))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_package(id: i64, conn: &mut SqliteConnection) -> Result<Option<OpenPackage>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM open_packages WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_active_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<OpenPackage>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM open_packages WHERE customer_id = $1 AND status = 'Active'")
        .bind(customer_id)
        .fetch_optional(conn)
        .await
}

/// Transition `Active → Closed`. Returns the row and whether this call performed the transition. Closing a
/// package that is already closed or shipped is a no-op.
pub async fn close_package(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(OpenPackage, bool), PackageError> {
    let closed: Option<OpenPackage> = sqlx::query_as(
        "UPDATE open_packages SET status = 'Closed', updated_at = $1 WHERE id = $2 AND status = 'Active' RETURNING *",
    )
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match closed {
        Some(p) => {
            debug!("🗃️ Package #{id} closed");
            Ok((p, true))
        },
        None => {
            let existing = fetch_package(id, conn).await?.ok_or(PackageError::PackageNotFound(id))?;
            trace!("🗃️ Package #{id} is already {}; close is a no-op", existing.status);
            Ok((existing, false))
        },
    }
}

/// Closes every active package whose deadline has passed. The comparison runs on unix epochs so it agrees with
/// the `is_closed` predicate regardless of how the timestamps were formatted.
pub async fn close_expired(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<OpenPackage>, PackageError> {
    let rows = sqlx::query_as(
        r#"
            UPDATE open_packages SET status = 'Closed', updated_at = $1
            WHERE status = 'Active' AND unixepoch(closes_at) <= unixepoch($1)
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Flags active packages that close within the horizon and have not been warned yet. Each package is returned by
/// exactly one call, so the closing-soon mail goes out once.
pub async fn take_closing_soon(
    horizon: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<OpenPackage>, PackageError> {
    let horizon_end = now + horizon;
    let rows = sqlx::query_as(
        r#"
            UPDATE open_packages SET reminder_sent = 1, updated_at = $1
            WHERE status = 'Active'
              AND reminder_sent = 0
              AND unixepoch(closes_at) > unixepoch($1)
              AND unixepoch(closes_at) <= unixepoch($2)
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(horizon_end)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Transition `Closed → Shipped`, setting the write-once shipment fields.
pub async fn attach_shipment(
    id: i64,
    tracking_number: &str,
    final_weight_g: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OpenPackage, PackageError> {
    let shipped: Option<OpenPackage> = sqlx::query_as(
        r#"
            UPDATE open_packages
            SET status = 'Shipped', tracking_number = $1, final_weight_g = $2, updated_at = $3
            WHERE id = $4 AND status = 'Closed'
            RETURNING *;
        "#,
    )
    .bind(tracking_number)
    .bind(final_weight_g)
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match shipped {
        Some(p) => {
            debug!("🗃️ Package #{id} shipped with tracking number {tracking_number}");
            Ok(p)
        },
        None => {
            let existing = fetch_package(id, conn).await?.ok_or(PackageError::PackageNotFound(id))?;
            Err(PackageError::PackageNotClosed { id, status: existing.status })
        },
    }
}

/// Adds the order's estimated weight to the package gauge.
pub async fn add_weight(id: i64, grams: i64, conn: &mut SqliteConnection) -> Result<OpenPackage, PackageError> {
    let result: Option<OpenPackage> = sqlx::query_as(
        "UPDATE open_packages SET virtual_weight_g = virtual_weight_g + $1, updated_at = CURRENT_TIMESTAMP WHERE id \
         = $2 RETURNING *",
    )
    .bind(grams)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(PackageError::PackageNotFound(id))
}

/// Inserts the join row attaching an order to a package. The unique constraint on `order_id` makes membership
/// exclusive and permanent.
pub async fn insert_package_order(
    package_id: i64,
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PackageOrder, PackageError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO open_package_orders (package_id, order_id, added_at)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(package_id)
    .bind(order_id.as_str())
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(po) => Ok(po),
        Err(e) if is_unique_violation(&e, "open_package_orders.order_id") => {
            Err(PackageError::OrderAlreadyPackaged(order_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

/// Flip the paid flag, returning whether this call flipped it. The conditional update makes webhook redelivery
/// harmless: only the first delivery observes `true`.
pub async fn mark_order_paid(
    package_order_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(PackageOrder, bool), PackageError> {
    let updated: Option<PackageOrder> = sqlx::query_as(
        "UPDATE open_package_orders SET is_paid = 1, paid_at = $1 WHERE id = $2 AND is_paid = 0 RETURNING *",
    )
    .bind(now)
    .bind(package_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(po) => Ok((po, true)),
        None => {
            let existing = fetch_package_order(package_order_id, conn)
                .await?
                .ok_or(PackageError::PackageOrderNotFound(package_order_id))?;
            trace!("🗃️ Package order #{package_order_id} was already paid; marking again is a no-op");
            Ok((existing, false))
        },
    }
}

pub async fn fetch_package_order(
    package_order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PackageOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM open_package_orders WHERE id = $1")
        .bind(package_order_id)
        .fetch_optional(conn)
        .await
}

/// All join rows for a package, in the order the orders were added.
pub async fn fetch_package_orders(
    package_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PackageOrder>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM open_package_orders WHERE package_id = $1 ORDER BY added_at ASC")
        .bind(package_id)
        .fetch_all(conn)
        .await
}

/// The package an order belongs to, if any.
pub async fn fetch_package_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<OpenPackage>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT open_packages.*
            FROM open_packages JOIN open_package_orders ON open_packages.id = open_package_orders.package_id
            WHERE open_package_orders.order_id = $1
        "#,
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await
}

/// Asserts that the package can accept a new order at `now`, closing it first if the deadline has passed.
/// Readers treat the deadline as authoritative over a stale `Active` row.
pub async fn ensure_accepting_orders(
    package: &OpenPackage,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), PackageError> {
    match package.effective_status(now) {
        PackageStatus::Active => Ok(()),
        status => {
            if package.status == PackageStatus::Active {
                // Stale row: persist the closure the deadline already implies.
                close_package(package.id, now, conn).await?;
            }
            Err(PackageError::PackageNotActive { id: package.id, status })
        },
    }
}
