use boutique_common::Eur;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{BalanceBucket, LedgerEntry, LoyaltyTier, NewLedgerEntry, OrderId, Profile},
    sqlite::db::is_unique_violation,
    traits::LedgerError,
};

pub async fn fetch_profile(customer_id: &str, conn: &mut SqliteConnection) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM profiles WHERE customer_id = $1").bind(customer_id).fetch_optional(conn).await
}

/// Fetches the profile for the customer, creating a zero-balance Bronze profile if none exists yet.
pub async fn fetch_or_create_profile(customer_id: &str, conn: &mut SqliteConnection) -> Result<Profile, LedgerError> {
    if let Some(profile) = fetch_profile(customer_id, &mut *conn).await? {
        return Ok(profile);
    }
    let profile = sqlx::query_as("INSERT INTO profiles (customer_id) VALUES ($1) RETURNING *")
        .bind(customer_id)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Created profile for customer {customer_id}");
    Ok(profile)
}

/// Appends one ledger entry and updates the cached balance it settles against, all on the caller's connection.
/// Callers compose this into a transaction when the posting must be atomic with other writes.
///
/// The tier multiplier is applied to gain entries here, at posting time, and recorded on the row. A debit that
/// would push the bucket negative is rejected; an order-keyed duplicate maps to [`LedgerError::DuplicatePosting`].
pub async fn post_entry(entry: NewLedgerEntry, conn: &mut SqliteConnection) -> Result<LedgerEntry, LedgerError> {
    let profile = fetch_or_create_profile(&entry.customer_id, &mut *conn).await?;
    let multiplier_bps = if entry.entry_type.is_gain() { profile.tier.multiplier_bps() } else { 10_000 };
    let amount = if entry.entry_type.is_gain() {
        Eur::from(entry.amount.value() * multiplier_bps / 10_000)
    } else {
        entry.amount
    };
    let current = match entry.entry_type.bucket() {
        BalanceBucket::Wallet => profile.wallet_balance,
        BalanceBucket::Loyalty => profile.loyalty_euros,
    };
    let resulting = current + amount;
    if resulting.is_negative() {
        return Err(LedgerError::InsufficientBalance { customer_id: entry.customer_id, amount, resulting });
    }
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO loyalty_ledger (customer_id, entry_type, amount, description, order_id, multiplier_bps)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(entry.customer_id.clone())
    .bind(entry.entry_type.to_string())
    .bind(amount)
    .bind(entry.description)
    .bind(entry.order_id.clone())
    .bind(multiplier_bps)
    .fetch_one(&mut *conn)
    .await;
    let posted: LedgerEntry = match inserted {
        Ok(row) => row,
        Err(e) if is_unique_violation(&e, "loyalty_ledger.order_id") => {
            // The index is partial on order_id IS NOT NULL, so the id is always present here.
            let order_id = entry.order_id.clone().unwrap_or_else(|| OrderId::from(""));
            return Err(LedgerError::DuplicatePosting { order_id, entry_type: entry.entry_type });
        },
        Err(e) => return Err(e.into()),
    };
    let column = match entry.entry_type.bucket() {
        BalanceBucket::Wallet => "wallet_balance",
        BalanceBucket::Loyalty => "loyalty_euros",
    };
    sqlx::query(&format!(
        "UPDATE profiles SET {column} = $1, updated_at = CURRENT_TIMESTAMP WHERE customer_id = $2"
    ))
    .bind(resulting)
    .bind(entry.customer_id)
    .execute(conn)
    .await
    .map_err(LedgerError::from)?;
    trace!("🗃️ Ledger entry #{} posted: {} {} for {}", posted.id, posted.entry_type, posted.amount, posted.customer_id);
    Ok(posted)
}

pub async fn entries_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM loyalty_ledger WHERE customer_id = $1 ORDER BY id ASC")
        .bind(customer_id)
        .fetch_all(conn)
        .await
}

pub async fn entries_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM loyalty_ledger WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await
}

pub async fn set_tier(
    customer_id: &str,
    tier: LoyaltyTier,
    conn: &mut SqliteConnection,
) -> Result<Profile, LedgerError> {
    fetch_or_create_profile(customer_id, &mut *conn).await?;
    let profile =
        sqlx::query_as("UPDATE profiles SET tier = $1, updated_at = CURRENT_TIMESTAMP WHERE customer_id = $2 RETURNING *")
            .bind(tier.to_string())
            .bind(customer_id)
            .fetch_one(conn)
            .await?;
    Ok(profile)
}
