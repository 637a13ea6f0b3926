//! # Boutique Package Engine
//!
//! Core logic for La Boutique de Morgane's "colis ouvert" shipping service: the open-package aggregation window
//! and the loyalty/cashback ledger it keeps consistent. The engine is storefront-agnostic; the storefront feeds
//! it order projections and payment confirmations, and it answers with package state, refund calculations and
//! ledger movements.
//!
//! The library is divided into three main sections:
//! 1. Backend contracts and storage ([`mod@traits`], [`SqliteDatabase`]). SQLite is the supported backend. You
//!    should never need to touch the database directly; use the public API instead. The row types in
//!    [`mod@db_types`] are public.
//! 2. The engine public API: [`PackageFlowApi`] for the package lifecycle, [`ReturnApi`] for returns,
//!    [`LedgerApi`] for balances and postings, and [`CouponApi`] for one-time-use coupons.
//! 3. Events ([`mod@events`]): package transitions emit events a host can hook into — the transactional mail
//!    sender subscribes to these. Handlers are fire-and-forget; a failed notification never rolls back a
//!    transition.
mod bpe_api;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use bpe_api::{
    coupon_api::CouponApi,
    errors::{PackageFlowError, ReturnFlowError},
    ledger_api::LedgerApi,
    package_flow_api::{PackageFlowApi, PackageFlowConfig},
    package_objects,
    return_api::ReturnApi,
    return_objects,
};
