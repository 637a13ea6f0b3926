mod support;

use boutique_engine::{
    db_types::{Eur, NewOpenPackage, NewOrder, OrderId, PackageStatus},
    events::EventProducers,
    traits::{PackageError, PackageManagement},
    PackageFlowApi,
    PackageFlowConfig,
    PackageFlowError,
    SqliteDatabase,
};
use chrono::Duration;

fn api(db: &SqliteDatabase) -> PackageFlowApi<SqliteDatabase> {
    PackageFlowApi::new(db.clone(), EventProducers::default(), PackageFlowConfig::default())
}

fn api_with_window(db: &SqliteDatabase, window: Duration) -> PackageFlowApi<SqliteDatabase> {
    let config = PackageFlowConfig { window, ..Default::default() };
    PackageFlowApi::new(db.clone(), EventProducers::default(), config)
}

async fn record_order(api: &PackageFlowApi<SqliteDatabase>, oid: &str, cust: &str, price: Eur, weight: i64) -> OrderId {
    let order_id = OrderId::from(oid);
    let order = NewOrder::new(order_id.clone(), cust, price).with_weight(weight);
    api.record_order(order).await.expect("Error recording order");
    order_id
}

#[tokio::test]
async fn only_one_active_package_per_customer() {
    let db = support::prepare_test_env().await;
    let api = api(&db);
    let opened = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");
    assert_eq!(opened.status, PackageStatus::Active);
    assert!(opened.closes_at > opened.opened_at);

    let second = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await;
    assert!(matches!(second, Err(PackageFlowError::PackageError(PackageError::ActivePackageExists(_)))));

    // Another customer is unaffected
    api.open_package(NewOpenPackage::new("cust-2", 1, 1)).await.expect("Error opening package for cust-2");
}

#[tokio::test]
async fn concurrent_opens_admit_exactly_one_package() {
    let db = support::prepare_test_env().await;
    let api1 = api(&db);
    let api2 = api(&db);
    let (a, b) = tokio::join!(
        api1.open_package(NewOpenPackage::new("racer", 1, 1)),
        api2.open_package(NewOpenPackage::new("racer", 1, 1)),
    );
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one of two concurrent opens must win");
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(failure, Err(PackageFlowError::PackageError(PackageError::ActivePackageExists(_)))));
}

#[tokio::test]
async fn orders_accumulate_weight_without_moving_the_deadline() {
    let db = support::prepare_test_env().await;
    let api = api(&db);
    let o1 = record_order(&api, "order-1", "cust-1", Eur::from_euros(30), 450).await;
    let o2 = record_order(&api, "order-2", "cust-1", Eur::from_euros(20), 800).await;

    let package = api.open_package(NewOpenPackage::new("cust-1", 2, 7)).await.expect("Error opening package");
    let deadline = package.closes_at;

    api.add_order(package.id, &o1).await.expect("Error adding order 1");
    api.add_order(package.id, &o2).await.expect("Error adding order 2");

    let summary = api.active_package("cust-1").await.expect("Error fetching active package").expect("No package");
    assert_eq!(summary.package.virtual_weight_g, 1250);
    assert_eq!(summary.package.closes_at, deadline, "the window is fixed at open time");
    assert_eq!(summary.orders.len(), 2);
    assert!(!summary.gauge.over_cap);
    assert!(!summary.countdown.expired);

    // An order cannot join a second time
    let again = api.add_order(package.id, &o1).await;
    assert!(matches!(again, Err(PackageFlowError::PackageError(PackageError::OrderAlreadyPackaged(_)))));
}

#[tokio::test]
async fn adding_an_unknown_order_fails() {
    let db = support::prepare_test_env().await;
    let api = api(&db);
    let package = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");
    let missing = OrderId::from("no-such-order");
    let result = api.add_order(package.id, &missing).await;
    assert!(matches!(result, Err(PackageFlowError::PackageError(PackageError::OrderNotFound(_)))));
}

#[tokio::test]
async fn expired_packages_read_as_closed_without_an_explicit_close() {
    let db = support::prepare_test_env().await;
    let api = api_with_window(&db, Duration::seconds(1));
    let o1 = record_order(&api, "order-1", "cust-1", Eur::from_euros(10), 100).await;
    let package = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");

    tokio::time::sleep(std::time::Duration::from_millis(1600)).await;

    // The read path treats the deadline as authoritative and persists the closure
    assert!(api.active_package("cust-1").await.expect("Error reading active package").is_none());
    let stored = api.db().fetch_package(package.id).await.expect("Error fetching package").expect("No package row");
    assert_eq!(stored.status, PackageStatus::Closed);

    // A closed package accepts no further orders
    let result = api.add_order(package.id, &o1).await;
    assert!(matches!(
        result,
        Err(PackageFlowError::PackageError(PackageError::PackageNotActive { status: PackageStatus::Closed, .. }))
    ));

    // And the customer may open a fresh one
    api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening replacement package");
}

#[tokio::test]
async fn close_is_idempotent_and_shipment_follows_closure() {
    let db = support::prepare_test_env().await;
    let api = api(&db);
    let package = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");

    // A shipment cannot be attached while the window is open
    let premature = api.attach_shipment(package.id, "6A0001112223", 1100).await;
    assert!(matches!(
        premature,
        Err(PackageFlowError::PackageError(PackageError::PackageNotClosed { status: PackageStatus::Active, .. }))
    ));

    let closed = api.close_package(package.id).await.expect("Error closing package");
    assert_eq!(closed.status, PackageStatus::Closed);
    // Closing again is a no-op, not an error
    let closed_again = api.close_package(package.id).await.expect("Error on idempotent close");
    assert_eq!(closed_again.status, PackageStatus::Closed);

    let shipped = api.attach_shipment(package.id, "6A0001112223", 1100).await.expect("Error attaching shipment");
    assert_eq!(shipped.status, PackageStatus::Shipped);
    assert_eq!(shipped.tracking_number.as_deref(), Some("6A0001112223"));
    assert_eq!(shipped.final_weight_g, Some(1100));

    // Shipped is terminal: no second shipment, no reopening
    let again = api.attach_shipment(package.id, "6A0009998887", 1200).await;
    assert!(matches!(
        again,
        Err(PackageFlowError::PackageError(PackageError::PackageNotClosed { status: PackageStatus::Shipped, .. }))
    ));
}

#[tokio::test]
async fn shipment_fields_are_validated() {
    let db = support::prepare_test_env().await;
    let api = api(&db);
    let package = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");
    api.close_package(package.id).await.expect("Error closing package");

    let blank = api.attach_shipment(package.id, "  ", 1000).await;
    assert!(matches!(blank, Err(PackageFlowError::PackageError(PackageError::ValidationError(_)))));
    let weightless = api.attach_shipment(package.id, "6A0001112223", 0).await;
    assert!(matches!(weightless, Err(PackageFlowError::PackageError(PackageError::ValidationError(_)))));
}

#[tokio::test]
async fn sweep_closes_expired_and_reminds_once() {
    let db = support::prepare_test_env().await;
    let short = api_with_window(&db, Duration::seconds(1));
    let long = api_with_window(&db, Duration::hours(48));

    short.open_package(NewOpenPackage::new("cust-expired", 1, 1)).await.expect("Error opening package");
    let warned = long.open_package(NewOpenPackage::new("cust-warned", 1, 1)).await.expect("Error opening package");

    tokio::time::sleep(std::time::Duration::from_millis(1600)).await;

    let outcome = long.sweep(Duration::hours(72)).await.expect("Error sweeping");
    assert_eq!(outcome.closed_count(), 1);
    assert_eq!(outcome.closed[0].customer_id, "cust-expired");
    assert_eq!(outcome.reminded_count(), 1);
    assert_eq!(outcome.reminded[0].id, warned.id);

    // A second pass closes nothing new and repeats no reminder
    let outcome = long.sweep(Duration::hours(72)).await.expect("Error sweeping again");
    assert_eq!(outcome.closed_count(), 0);
    assert_eq!(outcome.reminded_count(), 0);
}

#[tokio::test]
async fn gauge_flags_the_advisory_cap_without_blocking() {
    let db = support::prepare_test_env().await;
    let api = api(&db);
    let heavy = record_order(&api, "order-heavy", "cust-1", Eur::from_euros(500), 21_000).await;
    let light = record_order(&api, "order-light", "cust-1", Eur::from_euros(5), 50).await;
    let package = api.open_package(NewOpenPackage::new("cust-1", 1, 1)).await.expect("Error opening package");

    api.add_order(package.id, &heavy).await.expect("Error adding heavy order");
    let summary = api.active_package("cust-1").await.expect("Error fetching summary").expect("No package");
    assert!(summary.gauge.over_cap);
    assert_eq!(summary.gauge.fill_ratio, 1.0);

    // Crossing the cap is advisory only; more orders may still join
    api.add_order(package.id, &light).await.expect("The cap must not block new orders");
}
