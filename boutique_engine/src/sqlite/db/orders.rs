use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    traits::PackageError,
};

/// Inserts the order projection, returning `false` in the second element if the order was already recorded.
/// Re-recording an order is expected: the storefront may replay checkout events.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), PackageError> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("🗃️ Order [{}] recorded with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PackageError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                total_price,
                discount_total,
                estimated_weight_g,
                has_gift,
                gift_value
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.customer_id)
    .bind(order.total_price)
    .bind(order.discount_total)
    .bind(order.estimated_weight_g)
    .bind(order.has_gift)
    .bind(order.gift_value)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Stamps the delivery time on an order. The return-eligibility window starts here.
pub async fn mark_delivered(
    order_id: &OrderId,
    when: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, PackageError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET delivered_at = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *",
    )
    .bind(when)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| PackageError::OrderNotFound(order_id.clone()))
}
