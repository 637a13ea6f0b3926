use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CouponType, NewCoupon, NewCouponType, OrderId, UserCoupon},
    helpers::is_closed,
    sqlite::db::is_unique_violation,
    traits::CouponError,
};

pub async fn insert_coupon_type(
    coupon_type: NewCouponType,
    conn: &mut SqliteConnection,
) -> Result<CouponType, CouponError> {
    let row = sqlx::query_as("INSERT INTO coupon_types (name, value, validity_days) VALUES ($1, $2, $3) RETURNING *")
        .bind(coupon_type.name)
        .bind(coupon_type.value)
        .bind(coupon_type.validity_days)
        .fetch_one(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_coupon_type(id: i64, conn: &mut SqliteConnection) -> Result<Option<CouponType>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM coupon_types WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Issues a coupon. The `(customer, type, source, event_key)` unique index turns a double payout for the same
/// triggering event into [`CouponError::DuplicateIssue`], even when two requests race.
pub async fn insert_coupon(
    coupon: NewCoupon,
    valid_until: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<UserCoupon, CouponError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO user_coupons (customer_id, coupon_type_id, source, event_key, valid_until)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(coupon.customer_id.clone())
    .bind(coupon.coupon_type_id)
    .bind(coupon.source.to_string())
    .bind(coupon.event_key.clone())
    .bind(valid_until)
    .fetch_one(conn)
    .await;
    match result {
        Ok(c) => {
            let c: UserCoupon = c;
            debug!("🗃️ Coupon #{} issued to customer {} ({})", c.id, c.customer_id, c.source);
            Ok(c)
        },
        Err(e) if is_unique_violation(&e, "user_coupons.customer_id") => Err(CouponError::DuplicateIssue {
            customer_id: coupon.customer_id,
            coupon_type_id: coupon.coupon_type_id,
        }),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_coupon(id: i64, conn: &mut SqliteConnection) -> Result<Option<UserCoupon>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM user_coupons WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Consumes a coupon for an order. The conditional update is the whole concurrency story: of two simultaneous
/// checkouts spending the same coupon, exactly one matches `is_used = 0`.
pub async fn redeem_coupon(
    coupon_id: i64,
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<UserCoupon, CouponError> {
    let redeemed: Option<UserCoupon> = sqlx::query_as(
        r#"
            UPDATE user_coupons SET is_used = 1, used_at = $1, used_on_order = $2
            WHERE id = $3 AND is_used = 0 AND unixepoch(valid_until) > unixepoch($1)
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(order_id.as_str())
    .bind(coupon_id)
    .fetch_optional(&mut *conn)
    .await?;
    match redeemed {
        Some(c) => {
            debug!("🗃️ Coupon #{coupon_id} consumed by order {order_id}");
            Ok(c)
        },
        None => {
            let existing = fetch_coupon(coupon_id, conn).await?.ok_or(CouponError::CouponNotFound(coupon_id))?;
            if existing.is_used {
                Err(CouponError::AlreadyUsed(coupon_id))
            } else if is_closed(existing.valid_until, now) {
                Err(CouponError::Expired(coupon_id))
            } else {
                Err(CouponError::DatabaseError(format!("Could not redeem coupon {coupon_id}")))
            }
        },
    }
}

pub async fn coupons_for_customer(
    customer_id: &str,
    unused_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<UserCoupon>, sqlx::Error> {
    let sql = if unused_only {
        "SELECT * FROM user_coupons WHERE customer_id = $1 AND is_used = 0 ORDER BY created_at DESC"
    } else {
        "SELECT * FROM user_coupons WHERE customer_id = $1 ORDER BY created_at DESC"
    };
    sqlx::query_as(sql).bind(customer_id).fetch_all(conn).await
}
