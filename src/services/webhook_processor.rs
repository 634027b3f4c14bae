//! Applies Paystack charge outcomes to payments, wallets, chama ownership, fees and notifications.
//!
//! Each reference is processed inside one database transaction holding a row lock on the
//! payment, and only a `pending` payment is ever moved. Replayed or reordered callbacks
//! therefore never credit a wallet twice and never flip a settled payment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ServiceError;
use crate::models::money::format_minor;
use crate::models::{
    NewNotification, Notification, NotificationKind, PaymentChannel, PaymentPurpose, PaymentStatus,
    PaymentTransaction, WalletEntryKind,
};
use crate::paystack::gateway_message::{extract_available_balance, user_failure_message};
use crate::paystack::{ChargeData, WebhookEvent, WebhookKind};
use crate::services::fees::{self, FeeSplit};
use crate::services::notifications::insert_notification;
use crate::services::payments::lock_payment_by_reference;
use crate::services::wallets::{credit_wallet, record_entry, WalletEntry};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Processed {
        reference: String,
        status: PaymentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        fees: Option<FeeSplit>,
        #[serde(skip)]
        notifications: Vec<Notification>,
    },
    Duplicate {
        reference: String,
    },
    UnknownReference {
        reference: String,
    },
    /// The payment already settled the other way; left untouched for manual review.
    StatusConflict {
        reference: String,
        current: PaymentStatus,
        incoming: PaymentStatus,
    },
    Ignored {
        event: String,
    },
}

impl ProcessOutcome {
    pub fn notifications(&self) -> &[Notification] {
        match self {
            ProcessOutcome::Processed { notifications, .. } => notifications,
            _ => &[],
        }
    }

    fn tracking(&self) -> (&'static str, Option<String>) {
        match self {
            ProcessOutcome::Processed { .. } => ("completed", None),
            ProcessOutcome::Duplicate { .. } => ("duplicate", None),
            ProcessOutcome::UnknownReference { reference } => {
                ("failed", Some(format!("unknown reference {}", reference)))
            }
            ProcessOutcome::StatusConflict { current, incoming, .. } => (
                "conflict",
                Some(format!(
                    "payment already {}, refusing {}",
                    current.as_str(),
                    incoming.as_str()
                )),
            ),
            ProcessOutcome::Ignored { .. } => ("ignored", None),
        }
    }
}

/// Dispatch a verified webhook. Malformed charge payloads come back as `ServiceError::Validation`.
pub async fn process_event(
    pool: &PgPool,
    config: &Config,
    event: &WebhookEvent,
    raw: &Value,
) -> Result<ProcessOutcome, ServiceError> {
    match event.kind() {
        WebhookKind::ChargeSuccess => {
            let charge = event
                .charge()
                .map_err(|e| ServiceError::Validation(format!("Malformed charge payload: {}", e)))?;
            process_charge_success(pool, config, &charge, raw, &event.event).await
        }
        WebhookKind::ChargeFailed => {
            let charge = event
                .charge()
                .map_err(|e| ServiceError::Validation(format!("Malformed charge payload: {}", e)))?;
            process_charge_failed(pool, config, &charge, raw, &event.event).await
        }
        WebhookKind::Other(name) => {
            tracing::info!(event = %name, "Ignoring Paystack event");
            Ok(ProcessOutcome::Ignored { event: name })
        }
    }
}

pub async fn process_charge_success(
    pool: &PgPool,
    config: &Config,
    charge: &ChargeData,
    raw: &Value,
    source: &str,
) -> Result<ProcessOutcome, ServiceError> {
    let tracking_id = track_received(pool, source, charge, raw).await?;
    let result = apply_charge_success(pool, config, charge, raw).await;
    finish_tracking(pool, tracking_id, &result).await;
    result
}

pub async fn process_charge_failed(
    pool: &PgPool,
    config: &Config,
    charge: &ChargeData,
    raw: &Value,
    source: &str,
) -> Result<ProcessOutcome, ServiceError> {
    let tracking_id = track_received(pool, source, charge, raw).await?;
    let result = apply_charge_failed(pool, config, charge, raw).await;
    finish_tracking(pool, tracking_id, &result).await;
    result
}

async fn track_received(
    pool: &PgPool,
    event_type: &str,
    charge: &ChargeData,
    raw: &Value,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO paystack_webhooks
            (event_type, reference, amount, channel, customer_email, webhook_data, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'processing')
        RETURNING id
        "#,
    )
    .bind(event_type)
    .bind(&charge.reference)
    .bind(charge.amount)
    .bind(charge.channel.as_deref())
    .bind(charge.customer_email())
    .bind(raw)
    .fetch_one(pool)
    .await
}

async fn finish_tracking(pool: &PgPool, tracking_id: i64, result: &Result<ProcessOutcome, ServiceError>) {
    let (status, error) = match result {
        Ok(outcome) => outcome.tracking(),
        Err(e) => ("failed", Some(e.to_string())),
    };
    let update = sqlx::query(
        r#"
        UPDATE paystack_webhooks
        SET status = $2, error_message = $3, processed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(tracking_id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await;
    if let Err(e) = update {
        tracing::warn!(tracking_id, "Could not update webhook tracking row: {:?}", e);
    }
}

async fn apply_charge_success(
    pool: &PgPool,
    config: &Config,
    charge: &ChargeData,
    raw: &Value,
) -> Result<ProcessOutcome, ServiceError> {
    let reference = charge.reference.clone();
    let mut tx = pool.begin().await?;

    let payment = match lock_payment_by_reference(&mut tx, &reference).await? {
        Some(p) => p,
        None => {
            tracing::warn!(%reference, "charge.success for unknown reference");
            return Ok(ProcessOutcome::UnknownReference { reference });
        }
    };

    let current = payment.status();
    if !current.can_transition_to(PaymentStatus::Success) {
        if current == PaymentStatus::Success {
            tracing::info!(%reference, "Duplicate charge.success ignored");
            return Ok(ProcessOutcome::Duplicate { reference });
        }
        tracing::error!(%reference, ?current, "charge.success for a settled payment; needs review");
        return Ok(ProcessOutcome::StatusConflict {
            reference,
            current,
            incoming: PaymentStatus::Success,
        });
    }

    let channel = PaymentChannel::parse(charge.channel.as_deref());
    let paid_at = charge.paid_at().unwrap_or_else(Utc::now);
    let amount = if charge.amount > 0 {
        if charge.amount != payment.amount {
            tracing::warn!(%reference, expected = payment.amount, paid = charge.amount, "Paid amount differs from initialized amount");
        }
        charge.amount
    } else {
        payment.amount
    };
    let split = fees::split(amount, config.platform_fee_bps);

    sqlx::query(
        r#"
        UPDATE payment_transactions
        SET status = 'success',
            result_code = 0,
            result_desc = $2,
            receipt_number = $3,
            transaction_date = $4,
            channel = $5,
            callback_data = $6,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(format!("Payment via {} successful", channel))
    .bind(&reference)
    .bind(paid_at)
    .bind(channel.as_str())
    .bind(raw)
    .execute(&mut *tx)
    .await?;

    tracing::info!(
        %reference,
        user_id = %payment.user_id,
        purpose = %payment.purpose,
        gross = split.gross,
        fee = split.fee,
        net = split.net,
        %channel,
        "Processing successful payment"
    );

    let mut notifications = Vec::new();
    let purpose = payment.purpose();

    if purpose == Some(PaymentPurpose::ChamaPurchase) {
        match payment.chama_id {
            Some(chama_id) => {
                if let Some(n) =
                    settle_chama_purchase(&mut tx, &payment, chama_id, amount, paid_at, &channel).await?
                {
                    notifications.push(n);
                }
            }
            None => tracing::warn!(%reference, "chama_purchase payment without chama_id"),
        }
    }

    if purpose.map_or(false, |p| p.credits_wallet()) {
        notifications.push(credit_deposit(&mut tx, &payment, &split, &channel, paid_at).await?);
    } else {
        tracing::info!(%reference, purpose = %payment.purpose, "Skipping wallet update - purpose does not top up the wallet");
    }

    sqlx::query(
        r#"
        INSERT INTO platform_fees (user_id, fee_type, amount, source_transaction_id, payment_reference)
        VALUES ($1, 'transaction', $2, $3, $4)
        ON CONFLICT (payment_reference) DO NOTHING
        "#,
    )
    .bind(payment.user_id)
    .bind(split.fee)
    .bind(payment.source_transaction_id())
    .bind(&reference)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(%reference, fee = split.fee, "Payment processed");

    Ok(ProcessOutcome::Processed {
        reference,
        status: PaymentStatus::Success,
        fees: Some(split),
        notifications,
    })
}

async fn credit_deposit(
    conn: &mut PgConnection,
    payment: &PaymentTransaction,
    split: &FeeSplit,
    channel: &PaymentChannel,
    paid_at: DateTime<Utc>,
) -> Result<Notification, sqlx::Error> {
    let currency = payment.currency.as_str();
    let (previous, new_balance) = credit_wallet(&mut *conn, payment.user_id, split.net, currency).await?;

    tracing::info!(
        user_id = %payment.user_id,
        previous,
        adding = split.net,
        new = new_balance,
        "Central wallet credited"
    );

    record_entry(
        &mut *conn,
        WalletEntry {
            user_id: payment.user_id,
            kind: WalletEntryKind::Deposit,
            amount: split.net,
            description: format!(
                "{} deposit (Fee: {} {})",
                channel.short_label(),
                currency,
                format_minor(split.fee)
            ),
            reference: &payment.reference,
            payment_method: Some(channel.as_str()),
            currency,
        },
    )
    .await?;

    insert_notification(
        &mut *conn,
        NewNotification {
            user_id: payment.user_id,
            chama_id: payment.chama_id,
            kind: NotificationKind::PaymentSuccess,
            title: "💰 Payment Successful".to_string(),
            message: format!(
                "{} {} added via {}",
                currency,
                format_minor(split.net),
                channel.long_label()
            ),
            data: Some(json!({
                "amount": split.net,
                "channel": channel.as_str(),
                "reference": payment.reference,
                "timestamp": paid_at,
            })),
        },
    )
    .await
}

#[derive(sqlx::FromRow)]
struct PendingPurchase {
    id: Uuid,
    expected_amount: i64,
    chama_name: String,
}

async fn settle_chama_purchase(
    conn: &mut PgConnection,
    payment: &PaymentTransaction,
    chama_id: Uuid,
    amount_paid: i64,
    paid_at: DateTime<Utc>,
    channel: &PaymentChannel,
) -> Result<Option<Notification>, sqlx::Error> {
    let pending = sqlx::query_as::<_, PendingPurchase>(
        r#"
        SELECT p.id, p.expected_amount, c.name AS chama_name
        FROM pending_chama_purchases p
        JOIN chamas c ON c.id = p.chama_id
        WHERE p.chama_id = $1 AND p.buyer_user_id = $2 AND p.payment_status = 'pending'
        ORDER BY p.created_at DESC
        LIMIT 1
        FOR UPDATE OF p
        "#,
    )
    .bind(chama_id)
    .bind(payment.user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let pending = match pending {
        Some(p) => p,
        None => {
            tracing::warn!(%chama_id, buyer = %payment.user_id, "No pending purchase found");
            return Ok(None);
        }
    };
    let currency = payment.currency.as_str();

    if amount_paid != pending.expected_amount {
        tracing::error!(
            %chama_id,
            expected = pending.expected_amount,
            paid = amount_paid,
            "Chama purchase amount mismatch"
        );

        sqlx::query(
            r#"
            UPDATE pending_chama_purchases
            SET payment_status = 'failed', amount_paid = $2, metadata = metadata || $3
            WHERE id = $1
            "#,
        )
        .bind(pending.id)
        .bind(amount_paid)
        .bind(json!({
            "error": "Amount mismatch",
            "expected": pending.expected_amount,
            "paid": amount_paid,
        }))
        .execute(&mut *conn)
        .await?;

        let notification = insert_notification(
            &mut *conn,
            NewNotification {
                user_id: payment.user_id,
                chama_id: Some(chama_id),
                kind: NotificationKind::PaymentFailed,
                title: "❌ Chama Purchase Failed".to_string(),
                message: format!(
                    "Payment amount mismatch. Expected {} {}, received {} {}. Please contact support.",
                    currency,
                    format_minor(pending.expected_amount),
                    currency,
                    format_minor(amount_paid)
                ),
                data: None,
            },
        )
        .await?;
        return Ok(Some(notification));
    }

    sqlx::query(
        r#"
        UPDATE chamas
        SET purchased_by = $2, purchased_at = $3, purchase_amount = $4, total_savings = 0
        WHERE id = $1
        "#,
    )
    .bind(chama_id)
    .bind(payment.user_id)
    .bind(paid_at)
    .bind(amount_paid)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO chama_members (chama_id, user_id, role, is_active)
        VALUES ($1, $2, 'admin', true)
        ON CONFLICT (chama_id, user_id) DO UPDATE SET role = 'admin', is_active = true
        "#,
    )
    .bind(chama_id)
    .bind(payment.user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE pending_chama_purchases
        SET payment_status = 'verified',
            amount_paid = $2,
            payment_verified_at = $3,
            ownership_granted = true,
            paystack_reference = $4
        WHERE id = $1
        "#,
    )
    .bind(pending.id)
    .bind(amount_paid)
    .bind(paid_at)
    .bind(&payment.reference)
    .execute(&mut *conn)
    .await?;

    tracing::info!(%chama_id, owner = %payment.user_id, "Chama ownership granted");

    let notification = insert_notification(
        &mut *conn,
        NewNotification {
            user_id: payment.user_id,
            chama_id: Some(chama_id),
            kind: NotificationKind::ChamaPurchased,
            title: "🎉 Chama Purchase Successful".to_string(),
            message: format!(
                "You now own {}! You can start inviting members and managing your chama.",
                pending.chama_name
            ),
            data: Some(json!({
                "amount": amount_paid,
                "channel": channel.as_str(),
                "reference": payment.reference,
                "timestamp": paid_at,
            })),
        },
    )
    .await?;
    Ok(Some(notification))
}

async fn apply_charge_failed(
    pool: &PgPool,
    config: &Config,
    charge: &ChargeData,
    raw: &Value,
) -> Result<ProcessOutcome, ServiceError> {
    let reference = charge.reference.clone();
    let mut tx = pool.begin().await?;

    let payment = match lock_payment_by_reference(&mut tx, &reference).await? {
        Some(p) => p,
        None => {
            tracing::warn!(%reference, "charge.failed for unknown reference");
            return Ok(ProcessOutcome::UnknownReference { reference });
        }
    };

    let current = payment.status();
    if !current.can_transition_to(PaymentStatus::Failed) {
        if current == PaymentStatus::Failed {
            tracing::info!(%reference, "Duplicate charge.failed ignored");
            return Ok(ProcessOutcome::Duplicate { reference });
        }
        tracing::warn!(%reference, ?current, "charge.failed for a settled payment; keeping current status");
        return Ok(ProcessOutcome::StatusConflict {
            reference,
            current,
            incoming: PaymentStatus::Failed,
        });
    }

    let channel = PaymentChannel::parse(charge.channel.as_deref());
    let gateway_response = charge.gateway_response.as_deref();
    let available_balance = gateway_response.and_then(extract_available_balance);
    let currency = if payment.currency.is_empty() {
        config.default_currency.to_string()
    } else {
        payment.currency.clone()
    };
    let user_message = user_failure_message(gateway_response, &channel, available_balance, &currency);

    tracing::info!(%reference, reason = ?gateway_response, %channel, "Processing failed payment");

    let mut callback_data = raw.clone();
    if let Value::Object(map) = &mut callback_data {
        map.insert("available_balance".into(), json!(available_balance));
        map.insert("original_message".into(), json!(gateway_response));
    }

    sqlx::query(
        r#"
        UPDATE payment_transactions
        SET status = 'failed',
            result_code = 1,
            result_desc = $2,
            channel = $3,
            callback_data = $4,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(&user_message)
    .bind(channel.as_str())
    .bind(&callback_data)
    .execute(&mut *tx)
    .await?;

    let notification = insert_notification(
        &mut tx,
        NewNotification {
            user_id: payment.user_id,
            chama_id: payment.chama_id,
            kind: NotificationKind::PaymentFailed,
            title: "❌ Payment Failed".to_string(),
            message: user_message,
            data: Some(json!({
                "amount": payment.amount,
                "channel": channel.as_str(),
                "reference": reference,
                "available_balance": available_balance,
                "reason": gateway_response,
            })),
        },
    )
    .await?;

    tx.commit().await?;

    Ok(ProcessOutcome::Processed {
        reference,
        status: PaymentStatus::Failed,
        fees: None,
        notifications: vec![notification],
    })
}
