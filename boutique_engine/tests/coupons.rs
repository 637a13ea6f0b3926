mod support;

use boutique_engine::{
    db_types::{CouponSource, Eur, NewCoupon, NewCouponType, OrderId},
    traits::{CouponError, CouponManagement},
    CouponApi,
    SqliteDatabase,
};
use chrono::{Duration, Utc};

async fn welcome_type(api: &CouponApi<SqliteDatabase>) -> i64 {
    api.create_coupon_type(NewCouponType {
        name: "welcome-10".to_string(),
        value: Eur::from_euros(10),
        validity_days: 30,
    })
    .await
    .expect("Error creating coupon type")
    .id
}

#[tokio::test]
async fn a_triggering_event_pays_out_once() {
    let db = support::prepare_test_env().await;
    let api = CouponApi::new(db.clone());
    let type_id = welcome_type(&api).await;

    let coupon = api
        .issue_coupon(NewCoupon::new("cust-1", type_id, CouponSource::GameWin, "play-42"))
        .await
        .expect("Error issuing coupon");
    assert!(!coupon.is_used);
    assert!(coupon.valid_until > Utc::now() + Duration::days(29));

    // The same play cannot pay out twice
    let again = api.issue_coupon(NewCoupon::new("cust-1", type_id, CouponSource::GameWin, "play-42")).await;
    assert!(matches!(again, Err(CouponError::DuplicateIssue { .. })));

    // A different play (or another customer) is a different event
    api.issue_coupon(NewCoupon::new("cust-1", type_id, CouponSource::GameWin, "play-43"))
        .await
        .expect("Error issuing for a new event");
    api.issue_coupon(NewCoupon::new("cust-2", type_id, CouponSource::GameWin, "play-42"))
        .await
        .expect("Error issuing to another customer");
}

#[tokio::test]
async fn unknown_coupon_types_are_rejected() {
    let db = support::prepare_test_env().await;
    let api = CouponApi::new(db.clone());
    let result = api.issue_coupon(NewCoupon::new("cust-1", 999, CouponSource::Signup, "signup")).await;
    assert!(matches!(result, Err(CouponError::CouponTypeNotFound(999))));
}

#[tokio::test]
async fn concurrent_checkouts_cannot_both_spend_a_coupon() {
    let db = support::prepare_test_env().await;
    let api1 = CouponApi::new(db.clone());
    let api2 = CouponApi::new(db.clone());
    let type_id = welcome_type(&api1).await;
    let coupon = api1
        .issue_coupon(NewCoupon::new("cust-1", type_id, CouponSource::Signup, "signup"))
        .await
        .expect("Error issuing coupon");

    let order_a = OrderId::from("order-a");
    let order_b = OrderId::from("order-b");
    let (a, b) = tokio::join!(api1.redeem_coupon(coupon.id, &order_a), api2.redeem_coupon(coupon.id, &order_b));

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one checkout may consume the coupon");
    let winner = a.or(b).expect("One redemption must have succeeded");
    assert!(winner.is_used);
    let consumed_by = winner.used_on_order.expect("The consuming order must be recorded");
    assert!(consumed_by == order_a || consumed_by == order_b);

    // The flag never flips back
    let reread = db.fetch_coupon(coupon.id).await.expect("Error fetching coupon").expect("Coupon vanished");
    assert!(reread.is_used);
}

#[tokio::test]
async fn expired_coupons_cannot_be_redeemed() {
    let db = support::prepare_test_env().await;
    let api = CouponApi::new(db.clone());
    let type_id = welcome_type(&api).await;
    // Inserted directly with a validity window already in the past
    let stale = db
        .insert_coupon(
            NewCoupon::new("cust-1", type_id, CouponSource::Referral, "ref-1"),
            Utc::now() - Duration::days(1),
        )
        .await
        .expect("Error inserting stale coupon");

    let result = api.redeem_coupon(stale.id, &OrderId::from("order-1")).await;
    assert!(matches!(result, Err(CouponError::Expired(_))));
}

#[tokio::test]
async fn used_coupons_stay_used() {
    let db = support::prepare_test_env().await;
    let api = CouponApi::new(db.clone());
    let type_id = welcome_type(&api).await;
    let coupon = api
        .issue_coupon(NewCoupon::new("cust-1", type_id, CouponSource::Cashback, "order-99"))
        .await
        .expect("Error issuing coupon");

    api.redeem_coupon(coupon.id, &OrderId::from("order-1")).await.expect("Error redeeming");
    let again = api.redeem_coupon(coupon.id, &OrderId::from("order-2")).await;
    assert!(matches!(again, Err(CouponError::AlreadyUsed(_))));

    let unused = api.coupons_for_customer("cust-1", true).await.expect("Error listing coupons");
    assert!(unused.is_empty());
    let all = api.coupons_for_customer("cust-1", false).await.expect("Error listing coupons");
    assert_eq!(all.len(), 1);
}
