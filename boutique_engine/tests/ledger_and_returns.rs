mod support;

use boutique_engine::{
    db_types::{
        Eur,
        LedgerEntryType,
        LoyaltyTier,
        NewLedgerEntry,
        NewOpenPackage,
        NewOrder,
        OrderId,
        ReturnStatus,
        ReturnType,
    },
    events::EventProducers,
    return_objects::{DeclareReturn, ReturnItemRequest},
    traits::{LedgerError, LedgerManagement, PackageManagement, ReturnError},
    LedgerApi,
    PackageFlowApi,
    PackageFlowConfig,
    ReturnApi,
    ReturnFlowError,
    SqliteDatabase,
};
use chrono::{Duration, Utc};

const GIFT_THRESHOLD: Eur = Eur::from_cents(6_900);

fn package_api(db: &SqliteDatabase) -> PackageFlowApi<SqliteDatabase> {
    PackageFlowApi::new(db.clone(), EventProducers::default(), PackageFlowConfig::default())
}

fn return_api(db: &SqliteDatabase) -> ReturnApi<SqliteDatabase> {
    ReturnApi::new(db.clone(), Duration::days(14), GIFT_THRESHOLD)
}

fn item(product: &str, quantity: i64, unit_price: Eur) -> ReturnItemRequest {
    ReturnItemRequest {
        product_id: product.to_string(),
        product_name: format!("Product {product}"),
        product_slug: format!("product-{product}"),
        quantity,
        unit_price,
        variation: None,
        image_url: None,
    }
}

/// Records a delivered order so it is immediately return-eligible.
async fn delivered_order(db: &SqliteDatabase, order: NewOrder) -> OrderId {
    let order_id = order.order_id.clone();
    db.upsert_order(order).await.expect("Error recording order");
    db.mark_order_delivered(&order_id, Utc::now()).await.expect("Error marking delivered");
    order_id
}

#[tokio::test]
async fn cashback_is_posted_exactly_once_under_webhook_redelivery() {
    let db = support::prepare_test_env().await;
    let api = package_api(&db);
    let order_id = OrderId::from("order-1");
    api.record_order(NewOrder::new(order_id.clone(), "cust-1", Eur::from_euros(50)).with_weight(300))
        .await
        .expect("Error recording order");
    let package = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");
    let po = api.add_order(package.id, &order_id).await.expect("Error adding order");
    assert!(!po.is_paid);

    // First confirmation pays and posts 2% cashback
    let (paid, cashback) = api.confirm_order_paid(po.id).await.expect("Error confirming payment");
    assert!(paid.is_paid);
    let entry = cashback.expect("Cashback must be posted on first confirmation");
    assert_eq!(entry.entry_type, LedgerEntryType::OrderCashback);
    assert_eq!(entry.amount, Eur::from_cents(100));

    // The webhook is redelivered: no state change, no second credit
    let (paid_again, cashback_again) = api.confirm_order_paid(po.id).await.expect("Error on redelivery");
    assert!(paid_again.is_paid);
    assert!(cashback_again.is_none());

    let ledger = LedgerApi::new(db.clone());
    let balances = ledger.balances("cust-1").await.expect("Error fetching balances");
    assert_eq!(balances.loyalty, Eur::from_cents(100));
}

#[tokio::test]
async fn tier_multiplier_is_captured_at_posting_time() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    ledger.set_tier("cust-1", LoyaltyTier::Gold).await.expect("Error setting tier");

    let entry = ledger
        .post_entry(NewLedgerEntry::new("cust-1", LedgerEntryType::Review, Eur::from_euros(2), "Review reward"))
        .await
        .expect("Error posting entry");
    // Gold multiplies gains by 1.25; the multiplier is recorded on the row
    assert_eq!(entry.amount, Eur::from_cents(250));
    assert_eq!(entry.multiplier_bps, 12_500);

    // Dropping back to Bronze leaves the historical entry untouched
    ledger.set_tier("cust-1", LoyaltyTier::Bronze).await.expect("Error resetting tier");
    let entries = ledger.entries("cust-1").await.expect("Error listing entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, Eur::from_cents(250));
}

#[tokio::test]
async fn cached_balances_always_match_a_full_replay() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    for (entry_type, cents) in [
        (LedgerEntryType::Review, 150),
        (LedgerEntryType::DiamondFound, 500),
        (LedgerEntryType::Referral, 1000),
        (LedgerEntryType::Adjustment, 750),
    ] {
        ledger
            .post_entry(NewLedgerEntry::new("cust-1", entry_type, Eur::from_cents(cents), format!("{entry_type}")))
            .await
            .expect("Error posting entry");
    }
    let audit = ledger.audit("cust-1").await.expect("Error auditing");
    assert!(audit.is_consistent(), "cached {:?} != replayed {:?}", audit.cached, audit.replayed);
    // Review + DiamondFound + Referral land on the loyalty balance, Adjustment on the wallet
    assert_eq!(audit.cached.loyalty, Eur::from_cents(1650));
    assert_eq!(audit.cached.wallet, Eur::from_cents(750));
}

#[tokio::test]
async fn debits_never_push_a_balance_negative() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    let result = ledger
        .post_entry(NewLedgerEntry::new("cust-1", LedgerEntryType::Adjustment, Eur::from_euros(-10), "Oops"))
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
    assert_eq!(ledger.balances("cust-1").await.expect("Error fetching balances"), Default::default());
}

#[tokio::test]
async fn zero_amount_entries_are_rejected() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    let result =
        ledger.post_entry(NewLedgerEntry::new("cust-1", LedgerEntryType::Adjustment, Eur::default(), "Nothing")).await;
    assert!(matches!(result, Err(LedgerError::ValidationError(_))));
}

#[tokio::test]
async fn return_flow_prorates_discount_and_loyalty() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    // Order of 100 € with a 10 € order-level discount; 2 € of loyalty was earned on it
    let order_id = delivered_order(
        &db,
        NewOrder::new(OrderId::from("order-1"), "cust-1", Eur::from_euros(100)).with_discount(Eur::from_euros(10)),
    ).await;
    ledger
        .post_entry(
            NewLedgerEntry::new("cust-1", LedgerEntryType::OrderCashback, Eur::from_euros(2), "Cashback")
                .for_order(order_id.clone()),
        )
        .await
        .expect("Error posting cashback");

    let returns = return_api(&db);
    let declared = returns
        .declare_return(DeclareReturn {
            customer_id: "cust-1".to_string(),
            order_id: order_id.clone(),
            return_type: ReturnType::Credit,
            items: vec![item("p1", 1, Eur::from_euros(40))],
        })
        .await
        .expect("Error declaring return");

    let request = &declared.request;
    assert_eq!(request.status, ReturnStatus::Declared);
    assert_eq!(request.total_amount, Eur::from_euros(36));
    assert_eq!(request.loyalty_recovered, Eur::from_cents(80));
    assert_eq!(request.gift_deduction, Eur::default());
    assert_eq!(request.final_refund, Eur::from_cents(3520));
    assert_eq!(declared.items.len(), 1);
    assert_eq!(declared.items[0].discount_share, Eur::from_euros(4));
    assert_eq!(declared.items[0].net_amount, Eur::from_euros(36));

    // Staff progression; amounts stay frozen
    returns.advance_return(request.id, ReturnStatus::Received).await.expect("Error receiving");
    returns.advance_return(request.id, ReturnStatus::Validated).await.expect("Error validating");
    let (completed, posted) = returns.complete_return(request.id).await.expect("Error completing");
    assert_eq!(completed.status, ReturnStatus::Completed);
    assert_eq!(completed.final_refund, Eur::from_cents(3520));
    assert_eq!(posted.len(), 2);

    let balances = ledger.balances("cust-1").await.expect("Error fetching balances");
    assert_eq!(balances.loyalty, Eur::from_cents(120), "2.00 earned minus 0.80 clawed back");
    assert_eq!(balances.wallet, Eur::from_cents(3520), "credit return lands on the wallet");
    assert!(ledger.audit("cust-1").await.expect("Error auditing").is_consistent());
}

#[tokio::test]
async fn gift_is_clawed_back_when_the_order_falls_below_the_threshold() {
    let db = support::prepare_test_env().await;
    // 75 € order, above the 69 € gift threshold, with an 8 € gift
    let order_id = delivered_order(
        &db,
        NewOrder::new(OrderId::from("order-1"), "cust-1", Eur::from_euros(75)).with_gift(Eur::from_euros(8)),
    ).await;
    let returns = return_api(&db);
    let declared = returns
        .declare_return(DeclareReturn {
            customer_id: "cust-1".to_string(),
            order_id: order_id.clone(),
            return_type: ReturnType::Credit,
            items: vec![item("p1", 1, Eur::from_euros(20))],
        })
        .await
        .expect("Error declaring return");
    // 75 - 20 = 55 < 69: the gift value is deducted from the refund
    assert!(declared.request.claw_back_gift);
    assert_eq!(declared.request.gift_deduction, Eur::from_euros(8));
    assert_eq!(declared.request.final_refund, Eur::from_euros(12));

    // A second return against the same order cannot deduct the gift twice
    let second = returns
        .declare_return(DeclareReturn {
            customer_id: "cust-1".to_string(),
            order_id,
            return_type: ReturnType::Credit,
            items: vec![item("p2", 1, Eur::from_euros(10))],
        })
        .await
        .expect("Error declaring second return");
    assert!(!second.request.claw_back_gift);
    assert_eq!(second.request.gift_deduction, Eur::default());
    assert_eq!(second.request.final_refund, Eur::from_euros(10));
}

#[tokio::test]
async fn clawback_is_clamped_to_the_live_balance_at_completion() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    let order_id = delivered_order(
        &db,
        NewOrder::new(OrderId::from("order-1"), "cust-1", Eur::from_euros(100)),
    ).await;
    ledger
        .post_entry(
            NewLedgerEntry::new("cust-1", LedgerEntryType::OrderCashback, Eur::from_euros(2), "Cashback")
                .for_order(order_id.clone()),
        )
        .await
        .expect("Error posting cashback");

    let returns = return_api(&db);
    let declared = returns
        .declare_return(DeclareReturn {
            customer_id: "cust-1".to_string(),
            order_id,
            return_type: ReturnType::Refund,
            items: vec![item("p1", 1, Eur::from_euros(40))],
        })
        .await
        .expect("Error declaring return");
    assert_eq!(declared.request.loyalty_recovered, Eur::from_cents(80));

    // The customer spends loyalty between declaration and completion
    ledger
        .post_entry(NewLedgerEntry::new("cust-1", LedgerEntryType::ReturnClawback, Eur::from_cents(-150), "Spent"))
        .await
        .expect("Error draining balance");
    assert_eq!(ledger.balances("cust-1").await.expect("Error fetching balances").loyalty, Eur::from_cents(50));

    returns.advance_return(declared.request.id, ReturnStatus::Received).await.expect("Error receiving");
    returns.advance_return(declared.request.id, ReturnStatus::Validated).await.expect("Error validating");
    let (_, posted) = returns.complete_return(declared.request.id).await.expect("Error completing");

    // Wanted 0.80, but only 0.50 was left: the clawback is clamped and the balance lands exactly on zero
    assert_eq!(posted.len(), 1, "a refund-type return posts no wallet credit");
    assert_eq!(posted[0].entry_type, LedgerEntryType::ReturnClawback);
    assert_eq!(posted[0].amount, Eur::from_cents(-50));
    let balances = ledger.balances("cust-1").await.expect("Error fetching balances");
    assert_eq!(balances.loyalty, Eur::default());
    assert!(!balances.loyalty.is_negative());
}

#[tokio::test]
async fn cancelled_returns_post_nothing_and_are_terminal() {
    let db = support::prepare_test_env().await;
    let ledger = LedgerApi::new(db.clone());
    let order_id = delivered_order(
        &db,
        NewOrder::new(OrderId::from("order-1"), "cust-1", Eur::from_euros(30)),
    ).await;
    let returns = return_api(&db);
    let declared = returns
        .declare_return(DeclareReturn {
            customer_id: "cust-1".to_string(),
            order_id,
            return_type: ReturnType::Credit,
            items: vec![item("p1", 1, Eur::from_euros(30))],
        })
        .await
        .expect("Error declaring return");

    let cancelled = returns.cancel_return(declared.request.id).await.expect("Error cancelling");
    assert_eq!(cancelled.status, ReturnStatus::Cancelled);
    assert_eq!(ledger.entries("cust-1").await.expect("Error listing entries").len(), 0);

    // Terminal: neither advancing nor completing works any more
    let advance = returns.advance_return(declared.request.id, ReturnStatus::Received).await;
    assert!(matches!(advance, Err(ReturnFlowError::ReturnError(ReturnError::InvalidTransition { .. }))));
    let complete = returns.complete_return(declared.request.id).await;
    assert!(matches!(complete, Err(ReturnFlowError::ReturnError(ReturnError::InvalidTransition { .. }))));
}

#[tokio::test]
async fn the_return_window_is_enforced_at_declaration_time() {
    let db = support::prepare_test_env().await;
    let order_id = OrderId::from("order-1");
    db.upsert_order(NewOrder::new(order_id.clone(), "cust-1", Eur::from_euros(30)))
        .await
        .expect("Error recording order");

    let returns = return_api(&db);
    let declare = DeclareReturn {
        customer_id: "cust-1".to_string(),
        order_id: order_id.clone(),
        return_type: ReturnType::Credit,
        items: vec![item("p1", 1, Eur::from_euros(30))],
    };

    // Not delivered yet: not eligible
    let result = returns.declare_return(declare.clone()).await;
    assert!(matches!(result, Err(ReturnFlowError::ReturnError(ReturnError::NotDelivered(_)))));

    // Delivered 20 days ago: the 14-day window has passed
    db.mark_order_delivered(&order_id, Utc::now() - Duration::days(20)).await.expect("Error backdating delivery");
    let result = returns.declare_return(declare.clone()).await;
    assert!(matches!(result, Err(ReturnFlowError::ReturnError(ReturnError::WindowExpired { days: 14, .. }))));

    // Delivered yesterday: eligible
    db.mark_order_delivered(&order_id, Utc::now() - Duration::days(1)).await.expect("Error redating delivery");
    returns.declare_return(declare).await.expect("Error declaring in-window return");
}

#[tokio::test]
async fn a_return_cannot_exceed_the_order_total() {
    let db = support::prepare_test_env().await;
    let order_id = delivered_order(
        &db,
        NewOrder::new(OrderId::from("order-1"), "cust-1", Eur::from_euros(30)),
    ).await;
    let returns = return_api(&db);
    let result = returns
        .declare_return(DeclareReturn {
            customer_id: "cust-1".to_string(),
            order_id,
            return_type: ReturnType::Credit,
            items: vec![item("p1", 2, Eur::from_euros(20))],
        })
        .await;
    assert!(matches!(result, Err(ReturnFlowError::ReturnError(ReturnError::ValidationError(_)))));
}

#[tokio::test]
async fn returns_are_invisible_to_other_customers() {
    let db = support::prepare_test_env().await;
    let order_id = delivered_order(
        &db,
        NewOrder::new(OrderId::from("order-1"), "cust-1", Eur::from_euros(30)),
    ).await;
    let returns = return_api(&db);
    let result = returns
        .declare_return(DeclareReturn {
            customer_id: "someone-else".to_string(),
            order_id,
            return_type: ReturnType::Credit,
            items: vec![item("p1", 1, Eur::from_euros(30))],
        })
        .await;
    assert!(matches!(result, Err(ReturnFlowError::ReturnError(ReturnError::OrderNotFound(_)))));
}
