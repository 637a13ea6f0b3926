use boutique_common::Eur;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewReturnRequest, OrderId, ReturnItem, ReturnRequest, ReturnStatus},
    traits::ReturnError,
};

/// Persists a fully computed return with its frozen items.
pub async fn insert_return(
    request: NewReturnRequest,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReturnRequest, ReturnError> {
    let inserted: ReturnRequest = sqlx::query_as(
        r#"
            INSERT INTO return_requests (
                return_number,
                customer_id,
                order_id,
                return_type,
                status,
                total_amount,
                loyalty_recovered,
                gift_deduction,
                claw_back_gift,
                final_refund,
                declared_at
            ) VALUES ($1, $2, $3, $4, 'Declared', $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(request.return_number.clone())
    .bind(request.customer_id.clone())
    .bind(request.order_id.as_str())
    .bind(request.return_type.to_string())
    .bind(request.total_amount)
    .bind(request.loyalty_recovered)
    .bind(request.gift_deduction)
    .bind(request.claw_back_gift)
    .bind(request.final_refund)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    for item in request.items {
        sqlx::query(
            r#"
                INSERT INTO return_items (
                    return_request_id,
                    product_id,
                    product_name,
                    product_slug,
                    quantity,
                    unit_price,
                    discount_share,
                    net_amount,
                    variation,
                    image_url
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(inserted.id)
        .bind(item.product_id)
        .bind(item.product_name)
        .bind(item.product_slug)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount_share)
        .bind(item.net_amount)
        .bind(item.variation)
        .bind(item.image_url)
        .execute(&mut *conn)
        .await
        .map_err(ReturnError::from)?;
    }
    debug!("🗃️ Return {} declared against order {}", inserted.return_number, inserted.order_id);
    Ok(inserted)
}

pub async fn fetch_return(id: i64, conn: &mut SqliteConnection) -> Result<Option<ReturnRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_requests WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_return_by_number(
    return_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_requests WHERE return_number = $1")
        .bind(return_number)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_return_items(return_id: i64, conn: &mut SqliteConnection) -> Result<Vec<ReturnItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_items WHERE return_request_id = $1 ORDER BY id ASC")
        .bind(return_id)
        .fetch_all(conn)
        .await
}

pub async fn returns_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReturnRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_requests WHERE customer_id = $1 ORDER BY declared_at DESC")
        .bind(customer_id)
        .fetch_all(conn)
        .await
}

/// Writes the new status and stamps the matching transition column, but only if the row is still in `from`.
/// Returns `None` when another request moved the return first; the caller decides what that means.
pub async fn update_status(
    id: i64,
    from: ReturnStatus,
    to: ReturnStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, ReturnError> {
    let column = match to {
        ReturnStatus::Received => "received_at",
        ReturnStatus::Validated => "validated_at",
        ReturnStatus::Completed => "completed_at",
        ReturnStatus::Cancelled => "cancelled_at",
        ReturnStatus::Declared => {
            return Err(ReturnError::ValidationError("A return cannot be reset to Declared".to_string()))
        },
    };
    let updated: Option<ReturnRequest> = sqlx::query_as(&format!(
        "UPDATE return_requests SET status = $1, {column} = $2 WHERE id = $3 AND status = $4 RETURNING *"
    ))
    .bind(to.to_string())
    .bind(now)
    .bind(id)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Whether a live (non-cancelled) return against this order already clawed the promotional gift back.
pub async fn gift_already_returned(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM return_requests WHERE order_id = $1 AND claw_back_gift = 1 AND status != 'Cancelled'",
    )
    .bind(order_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Gross value of everything already being returned against this order, cancelled returns excluded.
pub async fn returned_gross_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Eur, sqlx::Error> {
    let cents: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(return_items.unit_price * return_items.quantity), 0)
            FROM return_items JOIN return_requests ON return_requests.id = return_items.return_request_id
            WHERE return_requests.order_id = $1 AND return_requests.status != 'Cancelled'
        "#,
    )
    .bind(order_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(Eur::from(cents))
}
