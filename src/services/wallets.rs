use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{CentralWallet, Currency, WalletEntryKind, WalletTransaction};
use crate::paystack::PaymentGateway;

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub balance: i64,
    pub currency: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSync {
    pub success: bool,
    pub balance: i64,
    pub currency: String,
    pub synced_at: DateTime<Utc>,
}

pub struct WalletEntry<'a> {
    pub user_id: Uuid,
    pub kind: WalletEntryKind,
    pub amount: i64,
    pub description: String,
    pub reference: &'a str,
    pub payment_method: Option<&'a str>,
    pub currency: &'a str,
}

/// Adds `amount`, creating the wallet at zero first if needed. Returns `(previous, new)` balances.
pub async fn credit_wallet(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
    currency: &str,
) -> Result<(i64, i64), sqlx::Error> {
    let new_balance = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO user_central_wallets (user_id, balance, currency)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id)
        DO UPDATE SET balance = user_central_wallets.balance + EXCLUDED.balance, updated_at = NOW()
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(currency)
    .fetch_one(&mut *conn)
    .await?;

    Ok((new_balance - amount, new_balance))
}

/// Makes sure `create_for` has a wallet, then row-locks every wallet in `user_ids`
/// in ascending id order. Call before moving money between two wallets.
pub async fn lock_wallets(
    conn: &mut PgConnection,
    user_ids: &[Uuid],
    create_for: Uuid,
    currency: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_central_wallets (user_id, balance, currency)
        VALUES ($1, 0, $2)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(create_for)
    .bind(currency)
    .execute(&mut *conn)
    .await?;

    let mut ids = user_ids.to_vec();
    ids.sort();
    ids.dedup();
    sqlx::query(
        "SELECT user_id FROM user_central_wallets WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(())
}

/// Subtracts `amount`, refusing to go below zero. Returns the new balance.
pub async fn debit_wallet(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: i64,
) -> Result<i64, ServiceError> {
    let balance = sqlx::query_scalar::<_, i64>(
        "SELECT balance FROM user_central_wallets WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    match balance {
        Some(b) if b >= amount => {}
        _ => return Err(ServiceError::InsufficientFunds),
    }

    let new_balance = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE user_central_wallets
        SET balance = balance - $2, updated_at = NOW()
        WHERE user_id = $1
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await?;

    Ok(new_balance)
}

/// Ledger row. A second row for the same (user, reference, kind) is ignored.
pub async fn record_entry(conn: &mut PgConnection, entry: WalletEntry<'_>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO wallet_transactions
            (user_id, type, amount, description, status, reference_id, payment_method, currency)
        VALUES ($1, $2, $3, $4, 'completed', $5, $6, $7)
        ON CONFLICT (user_id, reference_id, type) DO NOTHING
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(entry.amount)
    .bind(&entry.description)
    .bind(entry.reference)
    .bind(entry.payment_method)
    .bind(entry.currency)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn wallet_summary(
    pool: &PgPool,
    user_id: Uuid,
    default_currency: Currency,
) -> Result<WalletSummary, sqlx::Error> {
    let wallet = sqlx::query_as::<_, CentralWallet>(
        "SELECT user_id, balance, currency, updated_at FROM user_central_wallets WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(match wallet {
        Some(w) => WalletSummary {
            balance: w.balance,
            currency: w.currency,
            updated_at: Some(w.updated_at),
        },
        None => WalletSummary {
            balance: 0,
            currency: default_currency.to_string(),
            updated_at: None,
        },
    })
}

pub async fn recent_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    sqlx::query_as::<_, WalletTransaction>(
        r#"
        SELECT id, user_id, type, amount, description, status, reference_id, payment_method, currency, created_at
        FROM wallet_transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Overwrites the user's central wallet with the provider account balance and audits it.
pub async fn sync_provider_balance(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    user_id: Uuid,
    default_currency: Currency,
) -> Result<BalanceSync, ServiceError> {
    let balances = gateway.fetch_balance().await?;
    let (balance, currency) = match balances.first() {
        Some(b) => (b.balance, b.currency.clone()),
        None => (0, default_currency.to_string()),
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO user_central_wallets (user_id, balance, currency)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id)
        DO UPDATE SET balance = EXCLUDED.balance, currency = EXCLUDED.currency, updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(balance)
    .bind(&currency)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO audit_logs (user_id, action, resource_type, resource_id, new_values)
        VALUES ($1, 'paystack_balance_sync', 'wallet', $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(user_id.to_string())
    .bind(serde_json::json!({ "balance": balance, "currency": currency }))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(%user_id, balance, %currency, "Wallet synced with Paystack balance");

    Ok(BalanceSync {
        success: true,
        balance,
        currency,
        synced_at: Utc::now(),
    })
}
