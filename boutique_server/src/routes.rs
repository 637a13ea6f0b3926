//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
//!
//! All handlers are async: every operation here is I/O against the database, and a blocking handler would stall
//! its worker thread. Authentication rides on the [`AuthenticatedUser`] extractor; privileged handlers call
//! `require_staff` before touching anything.
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use boutique_engine::{
    db_types::{NewCoupon, NewCouponType, NewLedgerEntry, NewOpenPackage, NewOrder, OrderId},
    return_objects::DeclareReturn,
    CouponApi,
    LedgerApi,
    PackageFlowApi,
    ReturnApi,
    SqliteDatabase,
};
use bytes::Bytes;
use log::*;

use crate::{
    auth::{verify_webhook_signature, AuthenticatedUser, Role, TokenIssuer},
    config::ServerConfig,
    data_objects::{
        AddOrderRequest,
        AdvanceReturnRequest,
        CouponQuery,
        CreateCouponTypeRequest,
        DeclareReturnRequest,
        IssueCouponRequest,
        JsonResponse,
        OpenPackageRequest,
        PaymentNotification,
        PostLedgerRequest,
        RecordOrderRequest,
        RedeemCouponRequest,
        SetTierRequest,
        ShipmentRequest,
        TokenRequest,
        TokenResponse,
    },
    errors::ServerError,
};

type PackageApi = web::Data<PackageFlowApi<SqliteDatabase>>;
type ReturnsApi = web::Data<ReturnApi<SqliteDatabase>>;
type BalancesApi = web::Data<LedgerApi<SqliteDatabase>>;
type CouponsApi = web::Data<CouponApi<SqliteDatabase>>;

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Auth  -------------------------------------------------------
/// Mints a bearer token. Only the storefront backend holds the service key, so customers cannot pick their own
/// identity or role.
#[post("/auth/token")]
pub async fn issue_token(
    req: HttpRequest,
    config: web::Data<ServerConfig>,
    issuer: web::Data<TokenIssuer>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse, ServerError> {
    let presented = req
        .headers()
        .get("x-service-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::AuthenticationError("No service key provided".to_string()))?;
    if presented != config.auth.service_key.reveal().as_str() {
        return Err(ServerError::AuthenticationError("Service key mismatch".to_string()));
    }
    let role: Role = body.role.parse()?;
    let token = issuer.issue(&body.customer_id, role)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

//----------------------------------------------   Packages  ---------------------------------------------------
#[post("/api/package")]
pub async fn open_package(
    user: AuthenticatedUser,
    api: PackageApi,
    body: web::Json<OpenPackageRequest>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Customer {} requests a new package", user.customer_id);
    let body = body.into_inner();
    let mut package = NewOpenPackage::new(user.customer_id, body.shipping_method_id, body.address_id);
    if body.shipping_cost_paid {
        package = package.with_shipping_cost_paid();
    }
    let opened = api.open_package(package).await?;
    Ok(HttpResponse::Ok().json(opened))
}

/// The caller's active package with live countdown fields, or `null` when none is open (a stale package past
/// its deadline reads as closed and is reported as `null` too).
#[get("/api/package")]
pub async fn my_package(user: AuthenticatedUser, api: PackageApi) -> Result<HttpResponse, ServerError> {
    let summary = api.active_package(&user.customer_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[post("/api/package/{id}/orders")]
pub async fn add_order_to_package(
    user: AuthenticatedUser,
    api: PackageApi,
    path: web::Path<i64>,
    body: web::Json<AddOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    let package_id = path.into_inner();
    let summary = api.package_summary(package_id).await?;
    if !user.can_act_for(&summary.package.customer_id) {
        return Err(ServerError::NoRecordFound(format!("Package {package_id}")));
    }
    let package_order = api.add_order(package_id, &body.order_id).await?;
    Ok(HttpResponse::Ok().json(package_order))
}

#[post("/api/package/{id}/close")]
pub async fn close_package(
    user: AuthenticatedUser,
    api: PackageApi,
    path: web::Path<i64>,
) -> Result<HttpResponse, ServerError> {
    let package_id = path.into_inner();
    let summary = api.package_summary(package_id).await?;
    if !user.can_act_for(&summary.package.customer_id) {
        return Err(ServerError::NoRecordFound(format!("Package {package_id}")));
    }
    let closed = api.close_package(package_id).await?;
    Ok(HttpResponse::Ok().json(closed))
}

#[post("/api/package/{id}/shipment")]
pub async fn attach_shipment(
    user: AuthenticatedUser,
    api: PackageApi,
    path: web::Path<i64>,
    body: web::Json<ShipmentRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let shipped = api.attach_shipment(path.into_inner(), &body.tracking_number, body.final_weight_g).await?;
    Ok(HttpResponse::Ok().json(shipped))
}

//----------------------------------------------   Orders  -----------------------------------------------------
/// Projects a storefront order into the engine. Called by the storefront backend on checkout; idempotent under
/// event replay.
#[post("/api/orders")]
pub async fn record_order(
    user: AuthenticatedUser,
    api: PackageApi,
    body: web::Json<RecordOrderRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let body = body.into_inner();
    let mut order = NewOrder::new(body.order_id, body.customer_id, body.total_price)
        .with_discount(body.discount_total)
        .with_weight(body.estimated_weight_g);
    if body.has_gift {
        order = order.with_gift(body.gift_value);
    }
    let (order, inserted) = api.record_order(order).await?;
    debug!("💻️ Order {} recorded (inserted: {inserted})", order.order_id);
    Ok(HttpResponse::Ok().json(order))
}

#[post("/api/orders/{order_id}/delivered")]
pub async fn order_delivered(
    user: AuthenticatedUser,
    api: PackageApi,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let order_id = OrderId::from(path.into_inner());
    let order = api.mark_order_delivered(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Returns  ----------------------------------------------------
#[post("/api/returns")]
pub async fn declare_return(
    user: AuthenticatedUser,
    api: ReturnsApi,
    body: web::Json<DeclareReturnRequest>,
) -> Result<HttpResponse, ServerError> {
    let body = body.into_inner();
    let declared = api
        .declare_return(DeclareReturn {
            customer_id: user.customer_id,
            order_id: body.order_id,
            return_type: body.return_type,
            items: body.items,
        })
        .await?;
    Ok(HttpResponse::Ok().json(declared))
}

#[get("/api/returns")]
pub async fn my_returns(user: AuthenticatedUser, api: ReturnsApi) -> Result<HttpResponse, ServerError> {
    let returns = api.returns_for_customer(&user.customer_id).await?;
    Ok(HttpResponse::Ok().json(returns))
}

/// Staff lifecycle control. `received` and `validated` advance the return; `completed` performs the ledger
/// postings atomically with the final transition.
#[post("/api/returns/{id}/status")]
pub async fn advance_return(
    user: AuthenticatedUser,
    api: ReturnsApi,
    path: web::Path<i64>,
    body: web::Json<AdvanceReturnRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let id = path.into_inner();
    use boutique_engine::db_types::ReturnStatus::*;
    let updated = match body.status {
        Received | Validated => api.advance_return(id, body.status).await?,
        Completed => api.complete_return(id).await?.0,
        Cancelled => api.cancel_return(id).await?,
        Declared => {
            return Err(ServerError::ValidationError("A return cannot be reset to declared".to_string()));
        },
    };
    Ok(HttpResponse::Ok().json(updated))
}

#[post("/api/returns/{id}/cancel")]
pub async fn cancel_return(
    user: AuthenticatedUser,
    api: ReturnsApi,
    path: web::Path<i64>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let existing = api.fetch_return(id).await?;
    if !user.can_act_for(&existing.request.customer_id) {
        return Err(ServerError::NoRecordFound(format!("Return {id}")));
    }
    let cancelled = api.cancel_return(id).await?;
    Ok(HttpResponse::Ok().json(cancelled))
}

//----------------------------------------------   Ledger  -----------------------------------------------------
#[get("/api/balance")]
pub async fn my_balance(user: AuthenticatedUser, api: BalancesApi) -> Result<HttpResponse, ServerError> {
    let balances = api.balances(&user.customer_id).await?;
    Ok(HttpResponse::Ok().json(balances))
}

#[get("/api/ledger")]
pub async fn my_ledger(user: AuthenticatedUser, api: BalancesApi) -> Result<HttpResponse, ServerError> {
    let entries = api.entries(&user.customer_id).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// Posting runs under a staff credential only: the ledger grants credit, and a customer token must never be
/// able to credit itself.
#[post("/api/ledger")]
pub async fn post_ledger_entry(
    user: AuthenticatedUser,
    api: BalancesApi,
    body: web::Json<PostLedgerRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let body = body.into_inner();
    let mut entry = NewLedgerEntry::new(body.customer_id, body.entry_type, body.amount, body.description);
    if let Some(order_id) = body.order_id {
        entry = entry.for_order(order_id);
    }
    let posted = api.post_entry(entry).await?;
    Ok(HttpResponse::Ok().json(posted))
}

#[get("/api/ledger/audit/{customer_id}")]
pub async fn audit_ledger(
    user: AuthenticatedUser,
    api: BalancesApi,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let audit = api.audit(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(audit))
}

#[post("/api/customers/{customer_id}/tier")]
pub async fn set_tier(
    user: AuthenticatedUser,
    api: BalancesApi,
    path: web::Path<String>,
    body: web::Json<SetTierRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let profile = api.set_tier(&path.into_inner(), body.tier).await?;
    Ok(HttpResponse::Ok().json(profile))
}

//----------------------------------------------   Coupons  ----------------------------------------------------
#[post("/api/coupon_types")]
pub async fn create_coupon_type(
    user: AuthenticatedUser,
    api: CouponsApi,
    body: web::Json<CreateCouponTypeRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let body = body.into_inner();
    let coupon_type = api
        .create_coupon_type(NewCouponType { name: body.name, value: body.value, validity_days: body.validity_days })
        .await?;
    Ok(HttpResponse::Ok().json(coupon_type))
}

#[post("/api/coupons")]
pub async fn issue_coupon(
    user: AuthenticatedUser,
    api: CouponsApi,
    body: web::Json<IssueCouponRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let body = body.into_inner();
    let coupon = api
        .issue_coupon(NewCoupon::new(body.customer_id, body.coupon_type_id, body.source, body.event_key))
        .await?;
    Ok(HttpResponse::Ok().json(coupon))
}

#[get("/api/coupons")]
pub async fn my_coupons(
    user: AuthenticatedUser,
    api: CouponsApi,
    query: web::Query<CouponQuery>,
) -> Result<HttpResponse, ServerError> {
    let coupons = api.coupons_for_customer(&user.customer_id, query.unused_only).await?;
    Ok(HttpResponse::Ok().json(coupons))
}

/// Consumes a coupon at checkout. Called by the storefront backend in the same flow that places the order, so
/// the single-use guarantee holds under concurrent checkouts.
#[post("/api/coupons/{id}/redeem")]
pub async fn redeem_coupon(
    user: AuthenticatedUser,
    api: CouponsApi,
    path: web::Path<i64>,
    body: web::Json<RedeemCouponRequest>,
) -> Result<HttpResponse, ServerError> {
    user.require_staff()?;
    let coupon = api.redeem_coupon(path.into_inner(), &body.order_id).await?;
    Ok(HttpResponse::Ok().json(coupon))
}

//----------------------------------------------   Webhooks  ---------------------------------------------------
/// Payment confirmation from the processor. The body is HMAC-signed; redeliveries are expected and harmless —
/// the paid flag flips once and cashback is keyed per order in the ledger.
#[post("/webhook/payment")]
pub async fn payment_webhook(
    req: HttpRequest,
    config: web::Data<ServerConfig>,
    api: PackageApi,
    body: Bytes,
) -> Result<HttpResponse, ServerError> {
    let signature = req
        .headers()
        .get("x-boutique-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::AuthenticationError("No webhook signature provided".to_string()))?;
    verify_webhook_signature(&config.auth.webhook_secret, &body, signature)?;
    let notification: PaymentNotification =
        serde_json::from_slice(&body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    debug!(
        "💻️ Payment confirmation for package order #{} (event {:?})",
        notification.package_order_id, notification.event_id
    );
    let (package_order, cashback) = api.confirm_order_paid(notification.package_order_id).await?;
    let message = match cashback {
        Some(entry) => format!("Order {} paid; {} cashback credited", package_order.order_id, entry.amount),
        None => format!("Order {} paid; cashback already credited", package_order.order_id),
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}
