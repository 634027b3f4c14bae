//! Provider-backed payments: creating the pending row, starting checkout, and reading status back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ServiceError;
use crate::models::ids::new_payment_reference;
use crate::models::{PaymentPurpose, PaymentTransaction};
use crate::paystack::{InitializeTransaction, PaymentGateway};

pub(crate) const PAYMENT_COLUMNS: &str = "id, user_id, chama_id, reference, purpose, amount, currency, status, channel, result_desc, metadata, created_at, updated_at";

pub async fn lock_payment_by_reference(
    conn: &mut PgConnection,
    reference: &str,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM payment_transactions WHERE reference = $1 FOR UPDATE",
        PAYMENT_COLUMNS
    );
    sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(reference)
        .fetch_optional(conn)
        .await
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub chama_id: Option<Uuid>,
    pub purpose: PaymentPurpose,
    pub amount: i64,
    pub currency: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutStarted {
    pub success: bool,
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

/// Insert the pending payment, then ask the provider for a checkout URL.
/// A provider failure marks the payment failed so it never lingers as pending.
pub async fn start_checkout(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    config: &Config,
    payment: NewPayment,
    payer_email: &str,
    channels: Vec<String>,
) -> Result<CheckoutStarted, ServiceError> {
    let reference = new_payment_reference();
    let payment_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO payment_transactions
            (id, user_id, chama_id, reference, purpose, amount, currency, status, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
        "#,
    )
    .bind(payment_id)
    .bind(payment.user_id)
    .bind(payment.chama_id)
    .bind(&reference)
    .bind(payment.purpose.as_str())
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.metadata)
    .execute(pool)
    .await?;

    let request = InitializeTransaction {
        email: payer_email.to_string(),
        amount: payment.amount,
        reference: reference.clone(),
        currency: payment.currency.clone(),
        callback_url: config.paystack_callback_url.clone(),
        metadata: payment.metadata.clone(),
        channels,
    };

    match gateway.initialize_transaction(&request).await {
        Ok(init) => {
            tracing::info!(%reference, purpose = payment.purpose.as_str(), amount = payment.amount, "Checkout started");
            Ok(CheckoutStarted {
                success: true,
                reference,
                authorization_url: init.authorization_url,
                access_code: init.access_code,
            })
        }
        Err(e) => {
            tracing::error!(%reference, "Paystack initialization failed: {}", e);
            sqlx::query(
                r#"
                UPDATE payment_transactions
                SET status = 'failed', result_code = 1, result_desc = $2, updated_at = NOW()
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(payment_id)
            .bind(format!("Initialization failed: {}", e))
            .execute(pool)
            .await?;
            Err(e.into())
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InitializePaymentRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Minor units. Ignored for chama purchases, which charge the listed price.
    pub amount: Option<i64>,
    pub purpose: PaymentPurpose,
    pub description: Option<String>,
    pub chama_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

pub async fn initialize_payment(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    config: &Config,
    user_id: Uuid,
    user_email: Option<&str>,
    request: InitializePaymentRequest,
) -> Result<CheckoutStarted, ServiceError> {
    let email = request
        .email
        .as_deref()
        .or(user_email)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ServiceError::Validation("Email is required for payment".to_string()))?
        .to_string();

    let amount = match request.purpose {
        PaymentPurpose::ChamaPurchase => {
            let chama_id = request.chama_id.ok_or_else(|| {
                ServiceError::Validation("chama_id is required for chama purchases".to_string())
            })?;
            let expected = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT expected_amount FROM pending_chama_purchases
                WHERE chama_id = $1 AND buyer_user_id = $2 AND payment_status = 'pending'
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(chama_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No pending purchase for this chama".to_string()))?;

            if matches!(request.amount, Some(a) if a != expected) {
                return Err(ServiceError::Validation(
                    "Amount does not match the chama price".to_string(),
                ));
            }
            expected
        }
        _ => match request.amount {
            Some(a) if a > 0 => a,
            _ => {
                return Err(ServiceError::Validation(
                    "Amount must be greater than 0".to_string(),
                ))
            }
        },
    };

    let mut metadata = match request.metadata {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    metadata.insert("purpose".into(), request.purpose.as_str().into());
    metadata.insert("user_id".into(), user_id.to_string().into());
    if let Some(description) = request.description {
        metadata.insert("description".into(), description.into());
    }
    if let Some(phone) = request.phone_number {
        metadata.insert("phone_number".into(), phone.into());
    }

    start_checkout(
        pool,
        gateway,
        config,
        NewPayment {
            user_id,
            chama_id: request.chama_id,
            purpose: request.purpose,
            amount,
            currency: config.default_currency.to_string(),
            metadata: serde_json::Value::Object(metadata),
        },
        &email,
        Vec::new(),
    )
    .await
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub reference: String,
    pub status: String,
    pub purpose: String,
    pub amount: i64,
    pub currency: String,
    pub result_desc: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// What the payment-callback page polls. Only the payer can see their payment.
pub async fn payment_status(
    pool: &PgPool,
    user_id: Uuid,
    reference: &str,
) -> Result<Option<PaymentStatusView>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM payment_transactions WHERE reference = $1 AND user_id = $2",
        PAYMENT_COLUMNS
    );
    let payment = sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(reference)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(payment.map(|p| PaymentStatusView {
        reference: p.reference,
        status: p.status,
        purpose: p.purpose,
        amount: p.amount,
        currency: p.currency,
        result_desc: p.result_desc,
        updated_at: p.updated_at,
    }))
}
