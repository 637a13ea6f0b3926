use std::time::Duration as StdDuration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use boutique_engine::{events::EventProducers, CouponApi, LedgerApi, PackageFlowApi, ReturnApi, SqliteDatabase};
use log::info;

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    routes::{
        add_order_to_package,
        advance_return,
        attach_shipment,
        audit_ledger,
        cancel_return,
        close_package,
        create_coupon_type,
        declare_return,
        health,
        issue_coupon,
        issue_token,
        my_balance,
        my_coupons,
        my_ledger,
        my_package,
        my_returns,
        open_package,
        order_delivered,
        payment_webhook,
        post_ledger_entry,
        record_order,
        redeem_coupon,
        set_tier,
    },
};

pub async fn run_server(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<(), ServerError> {
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let package_api = PackageFlowApi::new(db.clone(), producers.clone(), config.flow_config());
        let return_api = ReturnApi::new(db.clone(), config.return_window, config.gift_threshold);
        let ledger_api = LedgerApi::new(db.clone());
        let coupon_api = CouponApi::new(db.clone());
        let token_issuer = TokenIssuer::new(&config.auth);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bss::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(package_api))
            .app_data(web::Data::new(return_api))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(coupon_api))
            .app_data(web::Data::new(token_issuer))
            .service(health)
            .service(issue_token)
            .service(open_package)
            .service(my_package)
            .service(add_order_to_package)
            .service(close_package)
            .service(attach_shipment)
            .service(record_order)
            .service(order_delivered)
            .service(declare_return)
            .service(my_returns)
            .service(advance_return)
            .service(cancel_return)
            .service(my_balance)
            .service(my_ledger)
            .service(post_ledger_entry)
            .service(audit_ledger)
            .service(set_tier)
            .service(create_coupon_type)
            .service(issue_coupon)
            .service(my_coupons)
            .service(redeem_coupon)
            .service(payment_webhook)
    })
    .keep_alive(KeepAlive::Timeout(StdDuration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    info!("💻️ Server listening on {host}:{port}");
    Ok(srv)
}
