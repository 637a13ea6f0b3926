//! # Backend contracts
//!
//! This module defines the interface contracts a storage backend must implement to host the boutique engine.
//!
//! ## Packages
//! An open package is a customer-scoped aggregation window: orders placed while it is open ship together in one
//! parcel. The [`PackageManagement`] trait owns the package state machine (`Active → Closed → Shipped`), the order
//! projection the engine keeps, and the join rows linking orders to packages.
//!
//! ## Ledger
//! The [`LedgerManagement`] trait owns the append-only loyalty/wallet ledger and the cached per-customer balances.
//! The ledger is the source of truth; the cache must always be reproducible by replay.
//!
//! ## Returns and coupons
//! [`ReturnManagement`] persists return requests with amounts frozen at declaration time and posts the resulting
//! ledger movements when a return completes. [`CouponManagement`] enforces one-payout-per-event issuance and
//! atomic single-use redemption.
//!
//! [`StorefrontDatabase`] rolls the four contracts into the single bound the server and API layer program
//! against.
mod coupon_management;
mod data_objects;
mod ledger_management;
mod package_management;
mod return_management;
mod storefront_database;

pub use coupon_management::{CouponError, CouponManagement};
pub use data_objects::{Balances, BalanceAudit, SweepOutcome};
pub use ledger_management::{LedgerError, LedgerManagement};
pub use package_management::{PackageError, PackageManagement};
pub use return_management::{ReturnError, ReturnManagement};
pub use storefront_database::StorefrontDatabase;
