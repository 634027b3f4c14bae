//! Settles payments whose webhook never arrived by asking Paystack directly.

use serde::Serialize;
use sqlx::PgPool;

use crate::config::Config;
use crate::models::{Notification, PaymentTransaction};
use crate::paystack::{GatewayError, PaymentGateway};
use crate::services::payments::PAYMENT_COLUMNS;
use crate::services::webhook_processor::{process_charge_failed, process_charge_success, ProcessOutcome};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub still_pending: usize,
    /// Settled elsewhere before the lock, or refused as a conflict.
    pub skipped: usize,
    pub errors: usize,
    /// Created by this pass, for websocket push.
    #[serde(skip)]
    pub notifications: Vec<Notification>,
}

enum Verdict {
    Success,
    Failed,
    Pending,
}

fn verdict(provider_status: Option<&str>) -> Verdict {
    match provider_status {
        Some("success") => Verdict::Success,
        Some("failed") | Some("reversed") => Verdict::Failed,
        // `abandoned` checkouts can still be paid later.
        _ => Verdict::Pending,
    }
}

pub async fn stale_pending_payments(
    pool: &PgPool,
    older_than_minutes: i64,
    limit: i64,
) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM payment_transactions
        WHERE status = 'pending' AND created_at < NOW() - make_interval(mins => $1::int)
        ORDER BY created_at
        LIMIT $2
        "#,
        PAYMENT_COLUMNS
    );
    sqlx::query_as::<_, PaymentTransaction>(&sql)
        .bind(older_than_minutes as i32)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// One pass. With `dry_run` the provider is asked but nothing is written.
pub async fn reconcile_stale_payments(
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
    config: &Config,
    older_than_minutes: i64,
    limit: i64,
    dry_run: bool,
) -> Result<ReconcileReport, sqlx::Error> {
    let payments = stale_pending_payments(pool, older_than_minutes, limit).await?;
    let mut report = ReconcileReport::default();

    for payment in payments {
        report.checked += 1;
        let reference = payment.reference.as_str();

        let charge = match gateway.verify_transaction(reference).await {
            Ok(charge) => charge,
            Err(GatewayError::NotConfigured) => {
                tracing::warn!("Paystack not configured; skipping reconciliation");
                report.errors += 1;
                break;
            }
            Err(e) => {
                tracing::warn!(%reference, "Verification failed: {}", e);
                report.errors += 1;
                continue;
            }
        };

        let verdict = verdict(charge.status.as_deref());
        if dry_run {
            match verdict {
                Verdict::Success => report.succeeded += 1,
                Verdict::Failed => report.failed += 1,
                Verdict::Pending => report.still_pending += 1,
            }
            tracing::info!(%reference, status = ?charge.status, "Dry run: would settle payment");
            continue;
        }

        let raw = serde_json::to_value(&charge).unwrap_or_default();
        let result = match verdict {
            Verdict::Success => process_charge_success(pool, config, &charge, &raw, "verify.success").await,
            Verdict::Failed => process_charge_failed(pool, config, &charge, &raw, "verify.failed").await,
            Verdict::Pending => {
                report.still_pending += 1;
                continue;
            }
        };

        match result {
            Ok(outcome @ ProcessOutcome::Processed { .. }) => {
                match verdict {
                    Verdict::Success => report.succeeded += 1,
                    _ => report.failed += 1,
                }
                report.notifications.extend_from_slice(outcome.notifications());
            }
            Ok(outcome) => {
                tracing::info!(%reference, ?outcome, "Payment not settled by reconciliation");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(%reference, "Reconciliation failed: {}", e);
                report.errors += 1;
            }
        }
    }

    tracing::info!(
        checked = report.checked,
        succeeded = report.succeeded,
        failed = report.failed,
        still_pending = report.still_pending,
        skipped = report.skipped,
        errors = report.errors,
        "Reconciliation pass finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses() {
        assert!(matches!(verdict(Some("success")), Verdict::Success));
        assert!(matches!(verdict(Some("failed")), Verdict::Failed));
        assert!(matches!(verdict(Some("reversed")), Verdict::Failed));
        assert!(matches!(verdict(Some("abandoned")), Verdict::Pending));
        assert!(matches!(verdict(Some("ongoing")), Verdict::Pending));
        assert!(matches!(verdict(None), Verdict::Pending));
    }
}
