//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions.
//!
//! All of these are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open a transaction and pass `&mut tx` to compose
//! several calls atomically without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod coupons;
pub mod ledger;
pub mod orders;
pub mod packages;
pub mod returns;

const SQLITE_DB_URL: &str = "sqlite://data/boutique_store.db";

pub fn db_url() -> String {
    let result = env::var("BSS_DATABASE_URL").unwrap_or_else(|_| {
        info!("BSS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// True when the error is a SQLite uniqueness violation on the given column list, e.g.
/// `"open_packages.customer_id"`. SQLite reports these as `UNIQUE constraint failed: <columns>`.
pub(crate) fn is_unique_violation(e: &SqlxError, columns: &str) -> bool {
    match e {
        SqlxError::Database(de) => {
            let msg = de.message();
            msg.contains("UNIQUE constraint failed") && msg.contains(columns)
        },
        _ => false,
    }
}
